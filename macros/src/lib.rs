use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_quote, spanned::Spanned, ItemFn, Stmt};

/// Marks a test function and installs a `tracing` test writer before the body
/// runs.
///
/// Sync functions become plain `#[test]`s. Async functions run on a
/// current-thread tokio runtime, since everything in `rxfuse` is `!Send`.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let mut input = parse_macro_input!(item as ItemFn);

  let raw_args = proc_macro2::TokenStream::from(attr);
  if !raw_args.is_empty() {
    return TokenStream::from(
      syn::Error::new(raw_args.span(), "rxfuse_macro::test takes no arguments")
        .to_compile_error(),
    );
  }

  let init: Stmt = parse_quote! {
    let _ = ::tracing_subscriber::fmt()
      .with_test_writer()
      .with_env_filter(::tracing_subscriber::EnvFilter::from_default_env())
      .try_init();
  };
  input.block.stmts.insert(0, init);

  let test_attr = if input.sig.asyncness.is_some() {
    quote!(#[::tokio::test(flavor = "current_thread")])
  } else {
    quote!(#[test])
  };

  TokenStream::from(quote! {
    #test_attr
    #input
  })
}
