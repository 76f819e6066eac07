//! Envelope vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use signalroom_core::protocol::{Envelope, JoinPayload};

use vector_loader::load;

#[test]
fn envelope_vectors() {
    let files = [
        "join_full.json",
        "join_legacy_device.json",
        "offer_directed.json",
        "file_meta_broadcast.json",
        "custom_type.json",
        "missing_type.json",
        "not_json.json",
    ];

    for f in files {
        let v = load(f);
        let res = Envelope::from_json(&v.frame);

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.client_code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let env = res.expect("expected ok envelope");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(env.msg_type, ex["type"].as_str().unwrap(), "vector={}", v.description);
        assert_eq!(env.room_id, ex["roomId"].as_str().unwrap(), "vector={}", v.description);
        assert_eq!(env.device_id.as_deref(), ex["deviceId"].as_str(), "vector={}", v.description);
        assert_eq!(env.target(), ex["target"].as_str(), "vector={}", v.description);
        assert_eq!(
            env.payload.is_some(),
            ex["hasPayload"].as_bool().unwrap(),
            "vector={}",
            v.description
        );
    }
}

#[test]
fn join_payload_from_envelope() {
    let v = load("join_full.json");
    let env = Envelope::from_json(&v.frame).unwrap();
    let raw = env.payload.unwrap();
    let p: JoinPayload = serde_json::from_str(raw.get()).unwrap();
    assert_eq!(p.device_id, "dev-x");
    assert_eq!(p.display_name, "Alice's laptop");
}
