//! Projects [`procmem_core::Error`] onto a JSON-RPC error response:
//! every failing RPC returns `{error: {code, message}}`.
//!
//! Deliberately thinner than a typical crate-local error enum: the core
//! already carries a stable taxonomy with its own `code()`/`Display`, so
//! this module only needs the projection, not a second error enum.

use crate::jsonrpc::JsonRpcError;

#[must_use]
pub fn to_jsonrpc_error(error: &procmem_core::Error) -> JsonRpcError {
    error.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_projects_with_stable_code() {
        let e = procmem_core::Error::NotFound("capability 'x'".into());
        let rpc = to_jsonrpc_error(&e);
        assert_eq!(rpc.code, -32004);
        assert_eq!(rpc.message, "Not found: capability 'x'");
    }
}
