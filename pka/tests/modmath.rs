/*++

Licensed under the Apache-2.0 license.

File Name:

    modmath.rs

Abstract:

    File contains integration tests for the modular arithmetic primitives.

--*/

mod common;

use common::default_setup;
use dwc_pka::{
    curve_params, digits_to_be_bytes, modadd, moddiv, modinv, modmult, modreduce, modsub,
    CurveId, Error,
};
use num_bigint::BigUint;

fn to_big(digits: &[u64]) -> BigUint {
    BigUint::from_bytes_be(&digits_to_be_bytes(digits))
}

#[test]
fn test_modinv_modmult_roundtrip_p256() {
    // The fundamental primitive-layer round trip: x * (x^-1 mod p) mod p = 1,
    // with p the P-256 prime and four-digit operands.
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);
    let x: [u64; 4] = [0x1234_5678_9abc_def0, 0xfedc_ba98_7654_3210, 7, 0];

    let x_inv = modinv(&dev, &x, curve.p).unwrap();
    let one = modmult(&dev, &x, &x_inv, curve.p).unwrap();
    assert_eq!(one, vec![1, 0, 0, 0]);
}

#[test]
fn test_primitives_match_reference() {
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);
    let m = curve.n;
    let x: [u64; 4] = [0xdead_beef_0123_4567, 0x0fed_cba9_8765_4321, 0x42, 1];
    let y: [u64; 4] = [0x1111_2222_3333_4444, 0x5555_6666_7777_8888, 0x99, 2];

    let big_m = to_big(m);
    let big_x = to_big(&x) % &big_m;
    let big_y = to_big(&y) % &big_m;

    let sum = modadd(&dev, &x, &y, m).unwrap();
    assert_eq!(to_big(&sum), (to_big(&x) + to_big(&y)) % &big_m);

    let diff = modsub(&dev, &x, &y, m).unwrap();
    assert_eq!(
        to_big(&diff),
        ((&big_x + &big_m) - &big_y) % &big_m
    );

    let prod = modmult(&dev, &x, &y, m).unwrap();
    assert_eq!(to_big(&prod), (to_big(&x) * to_big(&y)) % &big_m);

    let red = modreduce(&dev, &x, m).unwrap();
    assert_eq!(to_big(&red), &big_x % &big_m);

    // x / y * y = x (mod m)
    let quot = moddiv(&dev, &x, &y, m).unwrap();
    let back = modmult(&dev, &quot, &y, m).unwrap();
    assert_eq!(to_big(&back), big_x % &big_m);
}

#[test]
fn test_mismatched_widths_rejected() {
    let (_periph, dev, _reg) = default_setup();
    let curve = curve_params(CurveId::NistP256);
    assert_eq!(
        modmult(&dev, &[1, 2, 3], &[1, 2, 3, 4], curve.p).err(),
        Some(Error::InvalidArgument)
    );
}

#[test]
fn test_no_firmware_reports_not_found() {
    let (_periph, dev, _reg) = common::bring_up_no_fw(Default::default(), Default::default());
    let curve = curve_params(CurveId::NistP256);
    let x = [1u64, 0, 0, 0];
    assert_eq!(
        modmult(&dev, &x, &x, curve.p).err(),
        Some(Error::NotFound)
    );
}
