/*++

Licensed under the Apache-2.0 license.

File Name:

    ecc.rs

Abstract:

    File contains integration tests for the ECC point-arithmetic layer.

--*/

mod common;

use common::default_setup;
use dwc_pka::{
    curve_params, digits_from_be_bytes, digits_to_be_bytes, is_pubkey_valid_full,
    is_pubkey_valid_partial, make_pub_key, pmult, pver, shamir, CurveId, EccPoint, Error,
    PointCheck,
};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::elliptic_curve::PrimeField;
use p256::{ProjectivePoint, Scalar};

fn scalar_from_u64(k: u64) -> Scalar {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&k.to_be_bytes());
    Scalar::from_repr(bytes.into()).unwrap()
}

/// Reference scalar multiple of G as digit coordinates.
fn reference_mul_g(k: u64) -> EccPoint {
    let pt = (ProjectivePoint::GENERATOR * scalar_from_u64(k)).to_affine();
    let encoded = pt.to_encoded_point(false);
    EccPoint {
        x: digits_from_be_bytes(encoded.x().unwrap(), 4).unwrap(),
        y: digits_from_be_bytes(encoded.y().unwrap(), 4).unwrap(),
    }
}

#[test]
fn test_pver_generator_on_curve() {
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);
    assert_eq!(pver(&dev, curve, &curve.g()).unwrap(), PointCheck::OnCurve);
}

#[test]
fn test_pver_off_curve_point() {
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);
    let mut pt = curve.g();
    pt.y[0] ^= 1;
    assert_eq!(pver(&dev, curve, &pt).unwrap(), PointCheck::NotOnCurve);
}

#[test]
fn test_pmult_matches_reference() {
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);
    for k in [2u64, 3, 0x1234_5678] {
        let mut scalar = vec![0u64; 4];
        scalar[0] = k;
        let hw = pmult(&dev, curve, &scalar, &curve.g()).unwrap();
        assert_eq!(hw, reference_mul_g(k), "k = {k}");
    }
}

#[test]
fn test_pmult_by_order_is_zero_point() {
    // Cofactor identity: n * G is the zero point.
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);
    let result = pmult(&dev, curve, curve.n, &curve.g()).unwrap();
    assert!(result.is_zero());
}

#[test]
fn test_pmult_p384() {
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP384);
    let result = pmult(&dev, curve, curve.n, &curve.g()).unwrap();
    assert!(result.is_zero());
    let mut one = vec![0u64; 6];
    one[0] = 1;
    assert_eq!(pmult(&dev, curve, &one, &curve.g()).unwrap(), curve.g());
}

#[test]
fn test_make_pub_key_validates() {
    // Generate-then-validate must be self-consistent.
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);
    let mut d = vec![0u64; 4];
    d[0] = 0xdeadbeef;
    let pub_key = make_pub_key(&dev, curve, &d).unwrap();
    is_pubkey_valid_full(&dev, curve, &pub_key).unwrap();
    assert_eq!(pub_key, reference_mul_g(0xdeadbeef));
}

#[test]
fn test_make_pub_key_rejects_bad_scalar() {
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);
    let zero = vec![0u64; 4];
    assert_eq!(
        make_pub_key(&dev, curve, &zero).err(),
        Some(Error::InvalidKey)
    );
    assert_eq!(
        make_pub_key(&dev, curve, curve.n).err(),
        Some(Error::InvalidKey)
    );
}

#[test]
fn test_pubkey_validation_rejects_bad_points() {
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);

    let zero = EccPoint::zero(4);
    assert_eq!(
        is_pubkey_valid_partial(&dev, curve, &zero).err(),
        Some(Error::InvalidKey)
    );

    // Coordinate out of range.
    let mut big = curve.g();
    big.x = curve.p.to_vec();
    assert_eq!(
        is_pubkey_valid_partial(&dev, curve, &big).err(),
        Some(Error::InvalidKey)
    );

    // Off the curve.
    let mut off = curve.g();
    off.x[0] ^= 2;
    assert_eq!(
        is_pubkey_valid_partial(&dev, curve, &off).err(),
        Some(Error::InvalidKey)
    );
}

#[test]
fn test_shamir_matches_reference() {
    // u1*G + u2*Q in one pass must equal the reference sum.
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);

    let q = reference_mul_g(77);
    let mut u1 = vec![0u64; 4];
    u1[0] = 1000003;
    let mut u2 = vec![0u64; 4];
    u2[0] = 999979;

    let hw = shamir(&dev, curve, &u1, &u2, &curve.g(), &q).unwrap();

    let expected = (ProjectivePoint::GENERATOR * scalar_from_u64(1000003)
        + ProjectivePoint::from(p256_affine(&q)) * scalar_from_u64(999979))
    .to_affine();
    let encoded = expected.to_encoded_point(false);
    assert_eq!(digits_to_be_bytes(&hw.x), encoded.x().unwrap().as_slice());
    assert_eq!(digits_to_be_bytes(&hw.y), encoded.y().unwrap().as_slice());
}

fn p256_affine(pt: &EccPoint) -> p256::AffinePoint {
    use p256::elliptic_curve::sec1::FromEncodedPoint;
    let x = digits_to_be_bytes(&pt.x);
    let y = digits_to_be_bytes(&pt.y);
    let encoded = p256::EncodedPoint::from_affine_coordinates(
        p256::FieldBytes::from_slice(&x),
        p256::FieldBytes::from_slice(&y),
        false,
    );
    Option::from(p256::AffinePoint::from_encoded_point(&encoded)).unwrap()
}
