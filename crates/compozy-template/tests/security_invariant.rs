//! Invariant 5: every expression containing `exec` or `system` as an
//! identifier is rejected, regardless of its syntactic position.

use compozy_template::check_security;
use proptest::prelude::*;

fn wrap_strategies() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("{{ IDENT }}".to_string()),
        Just("{{ .item.IDENT }}".to_string()),
        Just("{{ .value | IDENT }}".to_string()),
        Just("{{ if IDENT }}yes{% endif %}".to_string()),
        Just("{{ IDENT(\"arg\") }}".to_string()),
        Just("prefix {{ IDENT }} suffix".to_string()),
    ]
}

proptest! {
    #[test]
    fn blocklisted_identifier_rejected_in_any_position(
        template in wrap_strategies(),
        ident in prop_oneof![Just("exec"), Just("system")],
    ) {
        let expr = template.replace("IDENT", ident);
        prop_assert!(check_security(&expr).is_err());
    }

    #[test]
    fn benign_identifier_accepted_in_the_same_positions(
        template in wrap_strategies(),
    ) {
        let expr = template.replace("IDENT", "greeting");
        prop_assert!(check_security(&expr).is_ok());
    }
}
