//! Derive macros for microrabbit. `#[derive(Event)]` and `#[derive(Command)]` implement
//! `Message` plus the marker trait, so there is no hand-written `impl Message for T`.
//!
//! Options go in `#[message(...)]`:
//! - `name = "OrderPlaced"`: wire name (defaults to the type name)
//! - `timestamp = "created_at"`: field holding the creation time (defaults to `timestamp`)
//! - `reply = "bool"`: `Command::Reply` (commands only, defaults to `()`)

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, DeriveInput, LitStr, Type};

struct MessageArgs {
    name: Option<LitStr>,
    timestamp: Option<LitStr>,
    reply: Option<Type>,
}

fn parse_args(input: &DeriveInput) -> syn::Result<MessageArgs> {
    let mut args = MessageArgs {
        name: None,
        timestamp: None,
        reply: None,
    };
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("message")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                args.name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("timestamp") {
                args.timestamp = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("reply") {
                let lit: LitStr = meta.value()?.parse()?;
                args.reply = Some(lit.parse()?);
            } else {
                return Err(meta.error("expected `name`, `timestamp` or `reply`"));
            }
            Ok(())
        })?;
    }
    Ok(args)
}

fn message_impl(input: &DeriveInput, args: &MessageArgs) -> TokenStream2 {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let name = args
        .name
        .as_ref()
        .map(LitStr::value)
        .unwrap_or_else(|| ident.to_string());
    let field = args
        .timestamp
        .as_ref()
        .map(|lit| format_ident!("{}", lit.value()))
        .unwrap_or_else(|| format_ident!("timestamp"));
    quote! {
        impl #impl_generics ::microrabbit::Message for #ident #ty_generics #where_clause {
            fn name() -> &'static str {
                #name
            }

            fn timestamp(&self) -> ::microrabbit::Timestamp {
                self.#field
            }
        }
    }
}

/// Implements `Message` and `Event`. The type must also derive `Serialize` and `Deserialize`.
#[proc_macro_derive(Event, attributes(message))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let args = match parse_args(&input) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };
    if let Some(reply) = &args.reply {
        return syn::Error::new_spanned(reply, "`reply` only applies to commands")
            .to_compile_error()
            .into();
    }
    let message = message_impl(&input, &args);
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let expanded = quote! {
        #message
        impl #impl_generics ::microrabbit::Event for #ident #ty_generics #where_clause {}
    };
    TokenStream::from(expanded)
}

/// Implements `Message` and `Command`.
#[proc_macro_derive(Command, attributes(message))]
pub fn derive_command(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let args = match parse_args(&input) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };
    let message = message_impl(&input, &args);
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let reply = args
        .reply
        .as_ref()
        .map(|ty| quote!(#ty))
        .unwrap_or_else(|| quote!(()));
    let expanded = quote! {
        #message
        impl #impl_generics ::microrabbit::Command for #ident #ty_generics #where_clause {
            type Reply = #reply;
        }
    };
    TokenStream::from(expanded)
}
