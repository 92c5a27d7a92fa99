//! End-to-end agreement scenarios between two independently generated
//! parties, for both the classical and the hybrid variant.

use tessera_crypto::{
    BundleKeys, ChainRatchet, CipherSuite, CryptoError, KeyAgreement, Protocol, ProtocolConfig,
    Role, SafetyNumber, Session,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn parties(protocol: Protocol, config: &ProtocolConfig) -> (Session, Session) {
    init_tracing();
    let a = Session::generate(protocol, config).expect("party A");
    let b = Session::generate(protocol, config).expect("party B");
    (a, b)
}

// ── Classical ────────────────────────────────────────────────────────

#[test]
fn classical_hello_roundtrip() {
    let config = ProtocolConfig::default();
    let engine = KeyAgreement::new(&config);
    let (mut a, b) = parties(Protocol::X3dh, &config);

    let a_bundle = a.bundle();
    assert_eq!(a_bundle.pre_keys().len(), 10);

    let mut verified = a_bundle.clone().verify().expect("A's bundle verifies");
    let message = engine
        .encrypt_message(&b, &mut verified, b"hello")
        .expect("B encrypts");
    assert_eq!(message.used_pre_key_index, 0);
    assert!(message.kem_ciphertext.is_none());

    let plaintext = engine
        .decrypt_message(&mut a, &b.bundle(), &message)
        .expect("A decrypts");
    assert_eq!(plaintext, b"hello");
}

// ── Hybrid ───────────────────────────────────────────────────────────

#[test]
fn hybrid_hello_roundtrip() {
    let config = ProtocolConfig::default();
    let engine = KeyAgreement::new(&config);
    let (mut a, b) = parties(Protocol::Pqxdh, &config);

    let a_bundle = a.bundle();
    assert!(a_bundle.kem_public_key().is_some());

    let mut verified = a_bundle.verify().expect("A's bundle verifies");
    let message = engine
        .encrypt_message(&b, &mut verified, b"hello")
        .expect("B encrypts");
    let kem_ciphertext = message.kem_ciphertext.as_ref().expect("KEM ciphertext");
    assert!(!kem_ciphertext.is_empty());

    let plaintext = engine
        .decrypt_message(&mut a, &b.bundle(), &message)
        .expect("A decrypts");
    assert_eq!(plaintext, b"hello");
}

#[test]
fn classical_initiator_reaches_hybrid_responder() {
    let config = ProtocolConfig::default();
    let engine = KeyAgreement::new(&config);
    let mut responder = Session::generate(Protocol::Pqxdh, &config).unwrap();
    let initiator = Session::generate(Protocol::X3dh, &config).unwrap();

    let mut verified = responder.bundle().verify().unwrap();
    let message = engine
        .encrypt_message(&initiator, &mut verified, b"mixed")
        .unwrap();
    assert!(message.kem_ciphertext.is_some());

    let plaintext = engine
        .decrypt_message(&mut responder, &initiator.bundle(), &message)
        .unwrap();
    assert_eq!(plaintext, b"mixed");
}

// ── Tamper detection ─────────────────────────────────────────────────

#[test]
fn flipped_ephemeral_key_fails() {
    for protocol in [Protocol::X3dh, Protocol::Pqxdh] {
        let config = ProtocolConfig::default();
        let engine = KeyAgreement::new(&config);
        let (mut a, b) = parties(protocol, &config);

        let mut verified = a.bundle().verify().unwrap();
        let mut message = engine.encrypt_message(&b, &mut verified, b"hello").unwrap();
        message.ephemeral_key[0] ^= 0x01;

        assert!(engine.decrypt_message(&mut a, &b.bundle(), &message).is_err());
    }
}

#[test]
fn flipped_kem_ciphertext_fails() {
    let config = ProtocolConfig::default();
    let engine = KeyAgreement::new(&config);
    let (mut a, b) = parties(Protocol::Pqxdh, &config);

    let mut verified = a.bundle().verify().unwrap();
    let mut message = engine.encrypt_message(&b, &mut verified, b"hello").unwrap();
    let ciphertext = message.kem_ciphertext.as_mut().expect("KEM ciphertext");
    ciphertext[0] ^= 0x01;

    let result = engine.decrypt_message(&mut a, &b.bundle(), &message);
    assert!(matches!(result, Err(CryptoError::DecryptionError(_))));
}

#[test]
fn failed_decrypt_leaves_pre_key_available() {
    let config = ProtocolConfig::default();
    let engine = KeyAgreement::new(&config);
    let (mut a, b) = parties(Protocol::X3dh, &config);

    let mut verified = a.bundle().verify().unwrap();
    let message = engine.encrypt_message(&b, &mut verified, b"hello").unwrap();

    let mut corrupted = message.clone();
    let last = corrupted.ciphertext.len() - 1;
    corrupted.ciphertext[last] ^= 0x01;
    assert!(engine.decrypt_message(&mut a, &b.bundle(), &corrupted).is_err());
    assert!(!a.pre_keys().is_consumed(0));

    assert_eq!(
        engine.decrypt_message(&mut a, &b.bundle(), &message).unwrap(),
        b"hello"
    );
    assert!(a.pre_keys().is_consumed(0));
}

#[test]
fn replayed_initial_message_rejected() {
    let config = ProtocolConfig::default();
    let engine = KeyAgreement::new(&config);
    let (mut a, b) = parties(Protocol::X3dh, &config);

    let mut verified = a.bundle().verify().unwrap();
    let message = engine.encrypt_message(&b, &mut verified, b"hello").unwrap();
    engine.decrypt_message(&mut a, &b.bundle(), &message).unwrap();

    let replay = engine.decrypt_message(&mut a, &b.bundle(), &message);
    assert!(matches!(replay, Err(CryptoError::PreKeyConsumed(0))));
}

#[test]
fn mismatched_context_cannot_decrypt() {
    let sender_config = ProtocolConfig::default();
    let receiver_config = ProtocolConfig {
        context: "another-deployment".into(),
        ..ProtocolConfig::default()
    };
    let (mut a, b) = parties(Protocol::X3dh, &sender_config);

    let mut verified = a.bundle().verify().unwrap();
    let message = KeyAgreement::new(&sender_config)
        .encrypt_message(&b, &mut verified, b"hello")
        .unwrap();

    let result = KeyAgreement::new(&receiver_config).decrypt_message(&mut a, &b.bundle(), &message);
    assert!(matches!(result, Err(CryptoError::DecryptionError(_))));
}

#[test]
fn xchacha_suite_roundtrip() {
    let config = ProtocolConfig {
        cipher: CipherSuite::XChaCha20Poly1305,
        ..ProtocolConfig::default()
    };
    let engine = KeyAgreement::new(&config);
    let (mut a, b) = parties(Protocol::Pqxdh, &config);

    let mut verified = a.bundle().verify().unwrap();
    let message = engine.encrypt_message(&b, &mut verified, b"hello").unwrap();
    assert_eq!(
        engine.decrypt_message(&mut a, &b.bundle(), &message).unwrap(),
        b"hello"
    );
}

// ── Safety numbers ───────────────────────────────────────────────────

#[test]
fn safety_number_detects_substituted_identity() {
    let config = ProtocolConfig::default();
    let (a, b) = parties(Protocol::X3dh, &config);
    let attacker = Session::generate(Protocol::X3dh, &config).unwrap();

    let a_key = a.identity().public_key_bytes();
    let b_key = b.identity().public_key_bytes();
    let attacker_key = attacker.identity().public_key_bytes();

    let seen_by_a = SafetyNumber::generate(&a_key, &b_key);
    let seen_by_b = SafetyNumber::generate(&b_key, &a_key);
    assert_eq!(seen_by_a, seen_by_b);

    let with_attacker = SafetyNumber::generate(&a_key, &attacker_key);
    assert_ne!(seen_by_a, with_attacker);
}

// ── Forward ratchet ──────────────────────────────────────────────────

#[test]
fn forged_header_cannot_burn_pre_key() {
    let config = ProtocolConfig::default();
    let engine = KeyAgreement::new(&config);
    let (mut a, b) = parties(Protocol::X3dh, &config);
    let mallory = Session::generate(Protocol::X3dh, &config).unwrap();

    let mut forged_target = a.bundle().verify().unwrap();
    let (_, forged) = engine.initiate(&mallory, &mut forged_target).unwrap();
    let (forged_secret, _unclaimed) = engine.respond(&a, &mallory.bundle(), &forged).unwrap();
    let mut a_ratchet = ChainRatchet::new(&forged_secret, Role::Responder, 16).unwrap();

    // Traffic that does not come from the header's sender never authenticates.
    let mut b_target = a.bundle().verify().unwrap();
    let (b_secret, _) = engine.initiate(&b, &mut b_target).unwrap();
    let mut b_ratchet = ChainRatchet::new(&b_secret, Role::Initiator, 16).unwrap();
    let sealed = b_ratchet.seal(engine.cipher(), b"hello").unwrap();
    assert!(a_ratchet.open(engine.cipher(), &sealed).is_err());

    assert_eq!(a.pre_keys().remaining(), 10);
    let mut verified = a.bundle().verify().unwrap();
    let message = engine.encrypt_message(&b, &mut verified, b"hello").unwrap();
    assert_eq!(message.used_pre_key_index, 0);
    assert_eq!(
        engine.decrypt_message(&mut a, &b.bundle(), &message).unwrap(),
        b"hello"
    );
}

#[test]
fn ratchet_continues_from_agreed_secret() {
    let config = ProtocolConfig::default();
    let engine = KeyAgreement::new(&config);
    let (mut a, b) = parties(Protocol::Pqxdh, &config);

    let mut verified = a.bundle().verify().unwrap();
    let (b_secret, header) = engine.initiate(&b, &mut verified).unwrap();
    let (a_secret, claim) = engine.respond(&a, &b.bundle(), &header).unwrap();

    let max_skip = config.max_skipped_message_keys;
    let mut b_ratchet = ChainRatchet::new(&b_secret, Role::Initiator, max_skip).unwrap();
    let mut a_ratchet = ChainRatchet::new(&a_secret, Role::Responder, max_skip).unwrap();

    let first = b_ratchet.seal(engine.cipher(), b"first").unwrap();
    assert_eq!(a_ratchet.open(engine.cipher(), &first).unwrap(), b"first");
    a.commit_pre_key(claim).unwrap();
    assert!(a.pre_keys().is_consumed(0));

    for body in [&b"second"[..], b"third"] {
        let sealed = b_ratchet.seal(engine.cipher(), body).unwrap();
        assert_eq!(a_ratchet.open(engine.cipher(), &sealed).unwrap(), body);
    }

    let reply = a_ratchet.seal(engine.cipher(), b"ack").unwrap();
    assert_eq!(b_ratchet.open(engine.cipher(), &reply).unwrap(), b"ack");
}
