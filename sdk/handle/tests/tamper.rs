use chacha20poly1305::aead::rand_core::OsRng;
use privwealth_handle::{EncryptedHandle, HandleContext, HandleError, open_amount, seal_amount};
use privwealth_identity::{Address, Identity};
use x25519_dalek::{PublicKey, StaticSecret};

fn network() -> (StaticSecret, PublicKey) {
    let sk = StaticSecret::random_from_rng(OsRng);
    let pk = PublicKey::from(&sk);
    (sk, pk)
}

fn sealed(amount: u128) -> (StaticSecret, EncryptedHandle) {
    let (sk, pk) = network();
    let context = HandleContext::new(Identity([9u8; 32]), Address([4u8; 20]), 84532);
    (sk, seal_amount(amount, context, &pk).unwrap())
}

#[test]
fn tampered_ciphertext_fails() {
    let (sk, mut handle) = sealed(100);
    handle.ciphertext[0] ^= 0x01;
    assert_eq!(open_amount(&handle, &sk), Err(HandleError::DecryptionFailed));
}

#[test]
fn rebinding_owner_fails() {
    let (sk, mut handle) = sealed(100);
    handle.context.owner = Identity([8u8; 32]);
    assert_eq!(open_amount(&handle, &sk), Err(HandleError::DecryptionFailed));
}

#[test]
fn rebinding_destination_or_chain_fails() {
    let (sk, handle) = sealed(100);

    let mut moved = handle.clone();
    moved.context.destination = Address([5u8; 20]);
    assert!(open_amount(&moved, &sk).is_err());

    let mut other_chain = handle;
    other_chain.context.chain_id = 1;
    assert!(open_amount(&other_chain, &sk).is_err());
}

#[test]
fn hex_form_survives_copy_paste() {
    let (sk, handle) = sealed(42);
    let pasted = format!("  {}\n", handle.to_hex());
    let parsed = EncryptedHandle::from_hex(&pasted).unwrap();
    assert_eq!(parsed, handle);
    assert_eq!(open_amount(&parsed, &sk).unwrap(), 42);
}

#[test]
fn garbage_hex_is_rejected() {
    assert!(matches!(
        EncryptedHandle::from_hex("0xzz"),
        Err(HandleError::InvalidHex(_))
    ));
    assert!(EncryptedHandle::from_hex("0x0102").is_err());
}

#[test]
fn preview_is_truncated() {
    let (_, handle) = sealed(7);
    let preview = handle.preview();
    assert!(preview.ends_with("..."));
    assert_eq!(preview.len(), 35);
    assert!(handle.to_hex().starts_with(&preview[..32]));
}
