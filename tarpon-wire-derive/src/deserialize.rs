use proc_macro::TokenStream;
use quote::quote;

pub fn impl_deserialize_macro(ast: &syn::DeriveInput) -> TokenStream {
    let name = ast.ident.clone();
    let data = match ast.data {
        syn::Data::Struct(ref data) => data,
        _ => unimplemented!("WireDeserialize can only be derived for structs"),
    };
    let is_tuple_struct = matches!(data.fields, syn::Fields::Unnamed(_));

    let statements: Vec<proc_macro2::TokenStream> =
        data.fields.iter().map(deserialize_field).collect();

    let expanded = if is_tuple_struct {
        quote! {
            impl WireDeserialize for #name {
                fn wire_deserialize<R: std::io::Read>(mut source: R) -> Result<Self, WireError>
                {
                    Ok(#name (
                        #(#statements)*
                    ))
                }
            }
        }
    } else {
        quote! {
            impl WireDeserialize for #name {
                fn wire_deserialize<R: std::io::Read>(mut source: R) -> Result<Self, WireError>
                {
                    Ok(#name {
                        #(#statements)*
                    })
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn deserialize_field(field: &syn::Field) -> proc_macro2::TokenStream {
    let ty = field.ty.clone();
    match field.ident.clone() {
        Some(name) => {
            quote! { #name: <#ty as WireDeserialize>::wire_deserialize(&mut source)?, }
        }
        None => {
            quote! { <#ty as WireDeserialize>::wire_deserialize(&mut source)?, }
        }
    }
}
