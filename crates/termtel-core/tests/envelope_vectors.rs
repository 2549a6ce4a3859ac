//! Envelope codec vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use termtel_core::protocol::envelope::{decode, encode};

mod vector_loader;
use vector_loader::load;

#[test]
fn envelope_vectors() {
    let files = [
        "envelope_min.json",
        "envelope_telemetry.json",
        "envelope_no_payload.json",
        "envelope_missing_action.json",
        "envelope_not_json.json",
        "envelope_payload_array.json",
        "envelope_payload_null.json",
        "envelope_session_not_string.json",
    ];

    for f in files {
        let v = load(f);
        let res = decode(&v.text);

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let env = res.expect("expected ok envelope");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(env.session_id(), ex["session_id"].as_str().unwrap(), "vector={}", v.description);
        assert_eq!(env.action(), ex["action"].as_str().unwrap(), "vector={}", v.description);
        assert_eq!(
            env.payload().len() as u64,
            ex["payload_keys"].as_u64().unwrap(),
            "vector={}",
            v.description
        );

        // decode(encode(e)) == e for everything that decodes.
        let again = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(again, env, "vector={}", v.description);
    }
}

#[test]
fn telemetry_vector_keeps_facet_values() {
    let v = load("envelope_telemetry.json");
    let env = decode(&v.text).unwrap();
    assert_eq!(env.field("device_info").unwrap()["hostname"], "router1");
    assert_eq!(env.field("routing_table").unwrap().as_array().unwrap().len(), 2);
}
