//! SIP address helpers

/// Extract the user part of a `sip:user@domain` address.
///
/// Anything that does not look like a SIP URI is returned unchanged, so a
/// bare number or extension passes straight through.
pub fn extract_sip_username(address: &str) -> &str {
    address
        .strip_prefix("sip:")
        .and_then(|rest| rest.split_once('@'))
        .map(|(user, _)| user)
        .filter(|user| !user.is_empty())
        .unwrap_or(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extracts_user_part() {
        assert_eq!(extract_sip_username("sip:alice@pbx.example"), "alice");
        assert_eq!(extract_sip_username("sip:101@10.0.0.1:5060"), "101");
    }

    #[test]
    fn test_non_sip_passes_through() {
        assert_eq!(extract_sip_username("79990001122"), "79990001122");
        assert_eq!(extract_sip_username("sip:nodomain"), "sip:nodomain");
        assert_eq!(extract_sip_username("sip:@pbx"), "sip:@pbx");
        assert_eq!(extract_sip_username(""), "");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_wrapped_user_is_recovered(
            user in "[a-z0-9._-]{1,16}",
            domain in "[a-z0-9.]{1,16}",
        ) {
            let address = format!("sip:{}@{}", user, domain);
            prop_assert_eq!(extract_sip_username(&address), user.as_str());
        }

        #[test]
        fn prop_plain_strings_unchanged(s in "[0-9a-z]{0,20}") {
            prop_assert_eq!(extract_sip_username(&s), s.as_str());
        }
    }
}
