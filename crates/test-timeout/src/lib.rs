//! Test attributes with a hard wall-clock bound.
//!
//! `#[tokio_timeout_test]` replaces `#[tokio::test]`; `#[timeout]` wraps a
//! synchronous `#[test]`. Both run the body on a watchdog thread and fail the
//! test if it has not finished in time, even when the body never yields.
//!
//! ```ignore
//! #[test_timeout::tokio_timeout_test(10, multi_thread)]
//! async fn completes_quickly() { /* ... */ }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, Attribute, Ident, ItemFn, LitInt, Token};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

struct TimeoutArgs {
    secs: u64,
    multi_thread: Option<Ident>,
}

impl Parse for TimeoutArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = TimeoutArgs {
            secs: DEFAULT_TIMEOUT_SECS,
            multi_thread: None,
        };
        while !input.is_empty() {
            if input.peek(LitInt) {
                let lit: LitInt = input.parse()?;
                args.secs = lit.base10_parse()?;
                if args.secs == 0 {
                    return Err(syn::Error::new(lit.span(), "timeout must be greater than zero"));
                }
            } else {
                let flavor: Ident = input.parse()?;
                match flavor.to_string().as_str() {
                    "multi_thread" => args.multi_thread = Some(flavor),
                    "current_thread" => args.multi_thread = None,
                    _ => {
                        return Err(syn::Error::new(
                            flavor.span(),
                            "expected a timeout in seconds, `multi_thread` or `current_thread`",
                        ))
                    }
                }
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(args)
    }
}

/// Async test on a fresh Tokio runtime, bounded by `secs` (default 60).
#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as TimeoutArgs);
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            &sig.ident,
            "tokio_timeout_test can only be applied to async functions",
        )
        .to_compile_error()
        .into();
    }
    sig.asyncness = None;

    let attrs = strip_attributes(attrs, &["tokio", "test"]);
    let builder = if args.multi_thread.is_some() {
        quote!(tokio::runtime::Builder::new_multi_thread())
    } else {
        quote!(tokio::runtime::Builder::new_current_thread())
    };
    let secs = args.secs;
    let run = quote! {
        let runtime = #builder
            .enable_all()
            .build()
            .expect("failed to build Tokio runtime");
        runtime.block_on(async {
            tokio::time::timeout(std::time::Duration::from_secs(#secs), async move #block)
                .await
                .expect("test timed out");
        });
    };
    emit(&attrs, &vis, &sig, secs, run)
}

/// Synchronous test bounded by `secs` (default 60).
#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as TimeoutArgs);
    if let Some(flavor) = args.multi_thread {
        return syn::Error::new(flavor.span(), "runtime flavors apply to tokio_timeout_test only")
            .to_compile_error()
            .into();
    }
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            &sig.ident,
            "timeout attribute expects a synchronous test function",
        )
        .to_compile_error()
        .into();
    }

    let attrs = strip_attributes(attrs, &["test"]);
    emit(&attrs, &vis, &sig, args.secs, quote!(#block;))
}

/// Wraps `run` in a watchdog thread that reports back over a channel.
fn emit(
    attrs: &[Attribute],
    vis: &syn::Visibility,
    sig: &syn::Signature,
    secs: u64,
    run: TokenStream2,
) -> TokenStream {
    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let timeout_duration = std::time::Duration::from_secs(#secs);
            let (sender, receiver) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    #run
                }));
                let _ = sender.send(result);
            });
            match receiver.recv_timeout(timeout_duration) {
                Ok(Ok(())) => {}
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("test timed out after {}s", #secs)
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread failed before reporting result")
                }
            }
        }
    })
}

/// Drops attributes whose path is exactly `path` (e.g. `tokio::test`).
fn strip_attributes(attrs: Vec<Attribute>, path: &[&str]) -> Vec<Attribute> {
    attrs
        .into_iter()
        .filter(|attr| {
            let segments: Vec<String> = attr
                .path()
                .segments
                .iter()
                .map(|segment| segment.ident.to_string())
                .collect();
            segments != path
        })
        .collect()
}
