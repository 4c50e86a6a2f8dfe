//! Property tests for the manifest diff (§4.3, §8 property 5).

use std::collections::BTreeMap;

use ferrysync_manifest::{diff, DIR_SENTINEL};
use proptest::prelude::*;

fn arb_manifest() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        "[a-c]",
        prop_oneof![
            Just(DIR_SENTINEL.to_string()),
            "[0-9a-f]{4}",
        ],
        0..5,
    )
}

proptest! {
    /// `to_fetch` never contains a key the client maps to `DIR_SENTINEL`.
    #[test]
    fn to_fetch_excludes_client_directories(client in arb_manifest(), server in arb_manifest()) {
        let d = diff(&client, &server);
        for key in &d.to_fetch {
            prop_assert_ne!(client.get(key).map(String::as_str), Some(DIR_SENTINEL));
        }
    }

    /// Every fetched key is either absent on the server or differs in
    /// digest from the server's entry.
    #[test]
    fn to_fetch_entries_are_actually_stale(client in arb_manifest(), server in arb_manifest()) {
        let d = diff(&client, &server);
        for key in &d.to_fetch {
            let client_digest = &client[key];
            match server.get(key) {
                None => {}
                Some(server_digest) => {
                    prop_assert_ne!(server_digest, client_digest);
                    prop_assert_ne!(server_digest.as_str(), DIR_SENTINEL);
                }
            }
        }
    }

    /// Every deleted key is present on the server and absent from the
    /// client.
    #[test]
    fn to_delete_entries_are_server_only(client in arb_manifest(), server in arb_manifest()) {
        let d = diff(&client, &server);
        for key in &d.to_delete {
            prop_assert!(server.contains_key(key));
            prop_assert!(!client.contains_key(key));
        }
    }

    /// Diffing a manifest against itself never deletes or fetches
    /// anything.
    #[test]
    fn self_diff_is_empty(manifest in arb_manifest()) {
        let d = diff(&manifest, &manifest);
        prop_assert!(d.to_delete.is_empty());
        prop_assert!(d.to_fetch.is_empty());
    }
}
