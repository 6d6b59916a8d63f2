#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::registry::{resolve_tab_role, TabRole};
    use crate::response::{classify, parse_component, ResponseParams, WalletResponse};

    fn ids() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("req_[0-9a-f]{8}", 0..4)
    }

    proptest! {
        #[test]
        fn prop_tab_role_mapping(local in ids(), registry in ids()) {
            let role = resolve_tab_role(&local, &registry);
            let expected = if local.is_empty() && !registry.is_empty() {
                TabRole::Responder
            } else {
                TabRole::Original
            };
            prop_assert_eq!(role, expected);
        }

        #[test]
        fn prop_error_fields_always_win(
            code in "[0-9]{1,5}",
            nonce in "[1-9A-HJ-NP-Za-km-z]{8,32}",
            data in "[1-9A-HJ-NP-Za-km-z]{8,64}",
        ) {
            let mut params = ResponseParams::new();
            params.insert("errorCode".to_string(), code.clone());
            params.insert("nonce".to_string(), nonce);
            params.insert("data".to_string(), data);
            params.insert("phantom_encryption_public_key".to_string(), "K".to_string());
            let is_error = matches!(
                classify(&params),
                WalletResponse::Error { code: Some(c), .. } if c == code
            );
            prop_assert!(is_error);
        }

        #[test]
        fn prop_unmarked_params_are_unrecognized(
            fields in prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{1,8}", 0..6),
        ) {
            let marker_keys = ["errorCode", "errorMessage", "nonce", "data", "phantom_encryption_public_key"];
            prop_assume!(fields.keys().all(|k| !marker_keys.contains(&k.as_str())));
            prop_assert_eq!(classify(&fields), WalletResponse::Unrecognized);
        }

        #[test]
        fn prop_parse_component_never_panics(raw in ".{0,64}") {
            let _ = parse_component(&raw);
        }
    }
}
