extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::parse_macro_input;

/// Generates a test function that runs its body as a coroutine on the
/// thread-local executor.
///
/// The body is wrapped into [`chorus::test::run_test_and_block_on`], so it can
/// `.await`, spawn coroutines and use channels like any other coroutine.
///
/// # Example
///
/// ```ignore
/// #[chorus_macros::test]
/// fn test_answer() {
///     assert_eq!(async { 42 }.await, 42);
/// }
/// ```
#[proc_macro_attribute]
pub fn test(_args: TokenStream, input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as syn::ItemFn);
    let body = &input.block;
    let attrs = &input.attrs;
    let signature = &input.sig;
    let name = &signature.ident;
    if !signature.inputs.is_empty() {
        panic!("Test function must have zero arguments!");
    }

    let expanded = quote! {
        #[test]
        #(#attrs)*
        fn #name() {
            chorus::test::run_test_and_block_on(async {
                #body
            });
        }
    };

    TokenStream::from(expanded)
}
