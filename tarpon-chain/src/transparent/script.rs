#![allow(clippy::unit_arg)]
use crate::{
    compactsize::CompactSize,
    serialization::{WireDeserialize, WireError, WireSerialize},
};
use serde::{Deserialize, Serialize};
use std::{fmt, io};

use super::Witness;

/// Opcodes the validator needs to recognize.
///
/// Script *execution* is out of scope here (see the verifier trait in
/// `tarpon-consensus`); these are only the opcodes needed for structural
/// properties: sigop counting, output-pattern recognition, and the BIP 34
/// height push.
pub mod op {
    pub const PUSHDATA1: u8 = 0x4c;
    pub const PUSHDATA2: u8 = 0x4d;
    pub const PUSHDATA4: u8 = 0x4e;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    pub const RETURN: u8 = 0x6a;
    pub const EQUAL: u8 = 0x87;
    pub const HASH160: u8 = 0xa9;
    pub const CHECKSIG: u8 = 0xac;
    pub const CHECKSIGVERIFY: u8 = 0xad;
    pub const CHECKMULTISIG: u8 = 0xae;
    pub const CHECKMULTISIGVERIFY: u8 = 0xaf;
}

/// The number of sigops a non-accurate `CHECKMULTISIG` counts for.
const MULTISIG_DEFAULT_SIGOPS: usize = 20;

/// An encoding of a Bitcoin script.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Script(pub Vec<u8>);

/// One decoded script operation: the opcode and its push payload, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Op<'a> {
    pub code: u8,
    pub push: Option<&'a [u8]>,
}

/// Iterator over a script's operations.
///
/// Stops at the first malformed operation (a push length overrunning the
/// script); bitcoind counts sigops the same way, ignoring everything after
/// the parse error.
pub struct Ops<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Ops<'a> {
    type Item = Op<'a>;

    fn next(&mut self) -> Option<Op<'a>> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let code = self.bytes[self.pos];
        self.pos += 1;

        let push_len = match code {
            1..=0x4b => code as usize,
            op::PUSHDATA1 => {
                let len = *self.bytes.get(self.pos)? as usize;
                self.pos += 1;
                len
            }
            op::PUSHDATA2 => {
                let bytes = self.bytes.get(self.pos..self.pos + 2)?;
                self.pos += 2;
                u16::from_le_bytes([bytes[0], bytes[1]]) as usize
            }
            op::PUSHDATA4 => {
                let bytes = self.bytes.get(self.pos..self.pos + 4)?;
                self.pos += 4;
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            }
            _ => return Some(Op { code, push: None }),
        };

        let push = self.bytes.get(self.pos..self.pos + push_len)?;
        self.pos += push_len;
        Some(Op {
            code,
            push: Some(push),
        })
    }
}

impl Script {
    pub fn new(bytes: Vec<u8>) -> Script {
        Script(bytes)
    }

    pub fn serialized_size(&self) -> usize {
        CompactSize::size(self.0.len()) + self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Iterate the script's operations, stopping at the first parse error.
    pub fn ops(&self) -> Ops<'_> {
        Ops {
            bytes: &self.0,
            pos: 0,
        }
    }

    /// Count signature operations by opcode scan.
    ///
    /// In `accurate` mode (BIP 16), a `CHECKMULTISIG` directly preceded by a
    /// small-integer push counts that many sigops instead of the legacy flat
    /// 20.
    pub fn sigops(&self, accurate: bool) -> usize {
        let mut count = 0;
        let mut last_code: Option<u8> = None;
        for operation in self.ops() {
            match operation.code {
                op::CHECKSIG | op::CHECKSIGVERIFY => count += 1,
                op::CHECKMULTISIG | op::CHECKMULTISIGVERIFY => {
                    count += match last_code {
                        Some(n) if accurate && (op::OP_1..=op::OP_16).contains(&n) => {
                            (n - op::OP_1 + 1) as usize
                        }
                        _ => MULTISIG_DEFAULT_SIGOPS,
                    };
                }
                _ => {}
            }
            last_code = Some(operation.code);
        }
        count
    }

    /// Is this a pay-to-script-hash output script? (BIP 16)
    pub fn is_p2sh(&self) -> bool {
        self.0.len() == 23
            && self.0[0] == op::HASH160
            && self.0[1] == 0x14
            && self.0[22] == op::EQUAL
    }

    /// Decode this script as a segwit program: a version opcode followed by
    /// a single 2-to-40-byte push. (BIP 141)
    pub fn witness_program(&self) -> Option<(u8, &[u8])> {
        let bytes = &self.0;
        if bytes.len() < 4 || bytes.len() > 42 {
            return None;
        }
        let version = match bytes[0] {
            0x00 => 0,
            v @ op::OP_1..=op::OP_16 => v - op::OP_1 + 1,
            _ => return None,
        };
        let push_len = bytes[1] as usize;
        if push_len < 2 || push_len > 40 || bytes.len() != 2 + push_len {
            return None;
        }
        Some((version, &bytes[2..]))
    }

    /// The data of the script's final push, provided every operation is a
    /// push.
    ///
    /// This is how the redeem script is recovered from a P2SH unlock script.
    pub fn last_push(&self) -> Option<Vec<u8>> {
        let mut last = None;
        for operation in self.ops() {
            match operation.code {
                0x00..=op::PUSHDATA4 => last = Some(operation.push.unwrap_or(&[]).to_vec()),
                _ => return None,
            }
        }
        last
    }

    /// Sigops spent by the redeem script when `self` is a P2SH output being
    /// unlocked by `unlock_script`. (BIP 16)
    pub fn p2sh_sigops(&self, unlock_script: &Script) -> usize {
        if !self.is_p2sh() {
            return 0;
        }
        match unlock_script.last_push() {
            Some(redeem) => Script(redeem).sigops(true),
            None => 0,
        }
    }

    /// Witness sigops for an input spending `self`. (BIP 141)
    ///
    /// P2WPKH spends cost one sigop; P2WSH spends cost the accurate count of
    /// the witness script (the final witness stack item). P2SH-wrapped
    /// programs are unwrapped through the unlock script's final push.
    pub fn witness_sigops(&self, unlock_script: &Script, witness: &Witness) -> usize {
        let wrapped;
        let program = if let Some(program) = self.witness_program() {
            Some(program)
        } else if self.is_p2sh() {
            match unlock_script.last_push() {
                Some(redeem) => {
                    wrapped = Script(redeem);
                    wrapped.witness_program()
                }
                None => None,
            }
        } else {
            None
        };

        match program {
            Some((0, program)) if program.len() == 20 => 1,
            Some((0, program)) if program.len() == 32 => match witness.0.last() {
                Some(witness_script) => Script(witness_script.clone()).sigops(true),
                None => 0,
            },
            // Future witness versions carry no defined sigop cost.
            _ => 0,
        }
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Script")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl WireSerialize for Script {
    fn wire_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.0.wire_serialize(&mut writer)
    }
}

impl WireDeserialize for Script {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<Self, WireError> {
        Ok(Script(Vec::<u8>::wire_deserialize(&mut reader)?))
    }
}
