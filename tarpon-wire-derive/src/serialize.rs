use proc_macro::TokenStream;
use quote::quote;

pub fn impl_serialize_macro(ast: &syn::DeriveInput) -> TokenStream {
    let name = ast.ident.clone();
    match ast.data {
        syn::Data::Struct(ref data) => {
            let statements: Vec<proc_macro2::TokenStream> = data
                .fields
                .iter()
                .enumerate()
                .map(|(index, field)| serialize_field(field, index))
                .collect();

            let expanded = quote! {
                impl WireSerialize for #name {
                    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
                    where
                        W: std::io::Write,
                    {
                        #(#statements)*
                        Ok(())
                    }
                }
            };
            TokenStream::from(expanded)
        }
        syn::Data::Enum(ref data) => {
            let variants: Vec<proc_macro2::TokenStream> = data
                .variants
                .iter()
                .map(|variant| serialize_variant(variant, &name))
                .collect();

            let expanded = quote! {
                impl WireSerialize for #name {
                    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
                    where
                        W: std::io::Write,
                    {
                        match *self {
                            #(#variants)*
                        }
                        Ok(())
                    }
                }
            };
            TokenStream::from(expanded)
        }
        _ => unimplemented!("WireSerialize cannot be derived for unions"),
    }
}

fn serialize_field(field: &syn::Field, index: usize) -> proc_macro2::TokenStream {
    match field.ident.clone() {
        Some(id) => quote! { self.#id.wire_serialize(&mut target)?; },
        None => {
            let index = syn::Index::from(index);
            quote! { self.#index.wire_serialize(&mut target)?; }
        }
    }
}

fn serialize_variant(variant: &syn::Variant, name: &syn::Ident) -> proc_macro2::TokenStream {
    let ident = variant.ident.clone();

    let bindings: Vec<proc_macro2::TokenStream> = variant
        .fields
        .iter()
        .map(|field| {
            if let Some(ident) = field.ident.clone() {
                quote! { ref #ident, }
            } else {
                quote! { ref inner }
            }
        })
        .collect();

    let statements: Vec<proc_macro2::TokenStream> = variant
        .fields
        .iter()
        .map(|field| {
            if let Some(ident) = field.ident.clone() {
                quote! { #ident.wire_serialize(&mut target)?; }
            } else {
                quote! { inner.wire_serialize(&mut target)?; }
            }
        })
        .collect();

    if bindings.is_empty() {
        quote! { #name::#ident => {}, }
    } else {
        quote! { #name::#ident { #(#bindings)* } => {
            #(#statements)*
        }, }
    }
}
