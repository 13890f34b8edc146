// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Shamir secret sharing over the secp256k1 scalar field.
//!
//! Share `i` is the polynomial evaluated at `x = i + 1`, so index 0 never
//! reveals the secret.

use k256::elliptic_curve::{ops::Reduce, PrimeField};
use k256::{FieldBytes, Scalar, U256};
use ring::rand::{SecureRandom, SystemRandom};

/// Errors raised while splitting or combining shares.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ShamirError {
    #[error("Threshold {threshold} is invalid for {count} shares")]
    InvalidThreshold { threshold: u8, count: u8 },

    #[error("No shares to combine")]
    Empty,

    #[error("Duplicate share index {0}")]
    DuplicateIndex(u8),

    #[error("Share value is not a canonical scalar")]
    NonCanonical,

    #[error("Randomness unavailable")]
    Randomness,
}

/// One evaluation of the sharing polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    pub index: u8,
    pub value: Scalar,
}

impl Share {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.value.to_bytes().into()
    }

    pub fn from_bytes(index: u8, bytes: &[u8; 32]) -> Result<Self, ShamirError> {
        let value = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
            .ok_or(ShamirError::NonCanonical)?;
        Ok(Self { index, value })
    }
}

fn x_coordinate(index: u8) -> Scalar {
    Scalar::from(u64::from(index) + 1)
}

/// Uniformly random scalar from the system RNG.
pub fn random_scalar(rng: &SystemRandom) -> Result<Scalar, ShamirError> {
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes).map_err(|_| ShamirError::Randomness)?;
    Ok(<Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(&bytes)))
}

/// Split `secret` into `count` shares, any `threshold` of which recover it.
pub fn split(
    secret: &Scalar,
    threshold: u8,
    count: u8,
    rng: &SystemRandom,
) -> Result<Vec<Share>, ShamirError> {
    if threshold == 0 || threshold > count {
        return Err(ShamirError::InvalidThreshold { threshold, count });
    }

    let mut coefficients = Vec::with_capacity(threshold as usize);
    coefficients.push(*secret);
    for _ in 1..threshold {
        coefficients.push(random_scalar(rng)?);
    }

    Ok((0..count)
        .map(|index| {
            let x = x_coordinate(index);
            // Horner
            let value = coefficients
                .iter()
                .rev()
                .fold(Scalar::ZERO, |acc, coeff| acc * x + coeff);
            Share { index, value }
        })
        .collect())
}

/// Recover the secret by Lagrange interpolation at zero.
///
/// With fewer than `threshold` shares the result is an unrelated scalar;
/// callers detect that through the AEAD tag.
pub fn combine(shares: &[Share]) -> Result<Scalar, ShamirError> {
    if shares.is_empty() {
        return Err(ShamirError::Empty);
    }
    for (i, share) in shares.iter().enumerate() {
        if shares[..i].iter().any(|s| s.index == share.index) {
            return Err(ShamirError::DuplicateIndex(share.index));
        }
    }

    let mut secret = Scalar::ZERO;
    for (i, share_i) in shares.iter().enumerate() {
        let x_i = x_coordinate(share_i.index);
        let mut basis = Scalar::ONE;
        for (j, share_j) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            let x_j = x_coordinate(share_j.index);
            // Distinct indices keep the denominator non-zero
            let inverse = Option::<Scalar>::from((x_i - x_j).invert())
                .ok_or(ShamirError::DuplicateIndex(share_j.index))?;
            basis *= -x_j * inverse;
        }
        secret += share_i.value * basis;
    }
    Ok(secret)
}
