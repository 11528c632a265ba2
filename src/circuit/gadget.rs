// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use dusk_plonk::prelude::*;

use crate::hash::hash_two_gadget;
use crate::tree::MAX_DEPTH;

/// Private inputs of a membership opening, appended to the circuit.
#[derive(Debug, Clone, Copy)]
pub struct OpeningWitnesses {
    /// Compact path, as an integer.
    pub path: Witness,
    /// Siblings padded with zeroes.
    pub siblings: [Witness; MAX_DEPTH],
    /// Tree depth.
    pub depth: Witness,
}

/// Binds `witness` to the next public input.
pub fn assert_public<C>(composer: &mut C, witness: Witness, value: BlsScalar)
where
    C: Composer,
{
    let constraint = Constraint::new()
        .left(-BlsScalar::one())
        .a(witness)
        .public(value);
    composer.append_gate(constraint);
}

// a - b
fn sub<C: Composer>(composer: &mut C, a: Witness, b: Witness) -> Witness {
    let constraint = Constraint::new()
        .left(1)
        .a(a)
        .right(-BlsScalar::one())
        .b(b);
    composer.gate_add(constraint)
}

// a + b
fn add<C: Composer>(composer: &mut C, a: Witness, b: Witness) -> Witness {
    let constraint = Constraint::new().left(1).a(a).right(1).b(b);
    composer.gate_add(constraint)
}

// a * b
fn mul<C: Composer>(composer: &mut C, a: Witness, b: Witness) -> Witness {
    let constraint = Constraint::new().mult(1).a(a).b(b);
    composer.gate_mul(constraint)
}

/// Returns `x + bit * (y - x)`, i.e. `y` if `bit` is set and `x` otherwise.
///
/// `bit` is expected to be constrained as boolean by the caller.
pub fn select<C>(
    composer: &mut C,
    bit: Witness,
    x: Witness,
    y: Witness,
) -> Witness
where
    C: Composer,
{
    let diff = sub(composer, y, x);
    let delta = mul(composer, bit, diff);
    add(composer, x, delta)
}

/// Returns a boolean witness set to `1` iff `x != 0`.
///
/// The prover supplies the inverse of `x` (or zero); the constraints
/// `nz = x * inv` and `x * (1 - nz) = 0` leave no other choice.
pub fn is_non_zero<C>(composer: &mut C, x: Witness) -> Witness
where
    C: Composer,
{
    let value = composer[x];
    let inverse = value.invert().unwrap_or(BlsScalar::zero());
    let inverse = composer.append_witness(inverse);

    let nz = mul(composer, x, inverse);

    // x - x * nz = 0
    let constraint = Constraint::new()
        .mult(-BlsScalar::one())
        .a(x)
        .b(nz)
        .left(1);
    composer.append_gate(constraint);

    nz
}

/// Decompose `x` into `N` boolean witnesses, least significant first.
pub fn decompose<C, const N: usize>(
    composer: &mut C,
    x: Witness,
) -> [Witness; N]
where
    C: Composer,
{
    let value = composer[x].reduce().0[0];

    let mut bits = [C::ZERO; N];
    let mut acc = C::ZERO;
    let mut coeff = BlsScalar::one();

    for (i, bit) in bits.iter_mut().enumerate() {
        let b = BlsScalar::from((value >> i) & 1);
        *bit = composer.append_witness(b);
        composer.component_boolean(*bit);

        let constraint =
            Constraint::new().left(1).a(acc).right(coeff).b(*bit);
        acc = composer.gate_add(constraint);

        coeff = coeff.double();
    }

    composer.assert_equal(acc, x);

    bits
}

/// Constrains `MAX_DEPTH` "level enabled" flags: boolean, non increasing and
/// summing to `depth`. Level `i` is enabled iff `i < depth`, and a depth
/// above [`MAX_DEPTH`] is unsatisfiable.
pub fn level_flags<C>(
    composer: &mut C,
    depth: Witness,
) -> [Witness; MAX_DEPTH]
where
    C: Composer,
{
    let value = composer[depth].reduce().0[0];

    let mut flags = [C::ZERO; MAX_DEPTH];
    let mut sum = C::ZERO;

    for i in 0..MAX_DEPTH {
        let flag = BlsScalar::from(((i as u64) < value) as u64);
        flags[i] = composer.append_witness(flag);
        composer.component_boolean(flags[i]);

        if i > 0 {
            // flags[i] * flags[i - 1] - flags[i] = 0
            let constraint = Constraint::new()
                .mult(1)
                .a(flags[i])
                .b(flags[i - 1])
                .left(-BlsScalar::one());
            composer.append_gate(constraint);
        }

        sum = add(composer, sum, flags[i]);
    }

    composer.assert_equal(sum, depth);

    flags
}

/// Recomputes the root of a compact membership path starting at `leaf`.
///
/// At level `i` the running node is hashed with `siblings[i]` only if the
/// level is enabled and the sibling is not the zero padding. Bit `i` of the
/// path tells whether the running node is the right child.
pub fn membership_gadget<C>(
    composer: &mut C,
    leaf: Witness,
    opening: &OpeningWitnesses,
) -> Witness
where
    C: Composer,
{
    let bits = decompose::<C, MAX_DEPTH>(composer, opening.path);
    let flags = level_flags(composer, opening.depth);

    let mut node = leaf;

    for i in 0..MAX_DEPTH {
        let sibling = opening.siblings[i];

        let present = is_non_zero(composer, sibling);
        let active = mul(composer, flags[i], present);

        let left = select(composer, bits[i], node, sibling);
        let right = select(composer, bits[i], sibling, node);
        let hash = hash_two_gadget(composer, left, right);

        node = select(composer, active, node, hash);
    }

    node
}
