//! Derive macros for the consensus wire format.
//!
//! `#[derive(WireSerialize)]` and `#[derive(WireDeserialize)]` expand to
//! field-by-field implementations of the `WireSerialize`/`WireDeserialize`
//! traits defined in `tarpon-chain`. They are only suitable for types whose
//! wire layout is the concatenation of their fields in declaration order;
//! anything with markers, flags, or length prefixes that depend on content
//! (transactions, inputs) gets a hand-written impl instead.

extern crate proc_macro;
use proc_macro::TokenStream;

mod deserialize;
mod serialize;

#[proc_macro_derive(WireSerialize)]
pub fn wire_serializable(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).unwrap();
    serialize::impl_serialize_macro(&ast)
}

#[proc_macro_derive(WireDeserialize)]
pub fn wire_deserializable(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).unwrap();
    deserialize::impl_deserialize_macro(&ast)
}
