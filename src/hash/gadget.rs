// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use dusk_hades::{GadgetStrategy, WIDTH};
use dusk_plonk::prelude::*;

use super::{tag, COMMITMENT_DOMAIN, NODE_DOMAIN, NULLIFIER_DOMAIN};

fn fixed_gadget<C, const A: usize>(
    composer: &mut C,
    dom_sep: u32,
    messages: &[Witness; A],
) -> Witness
where
    C: Composer,
{
    // the tag is part of the circuit description, not of the witness
    let mut state = [C::ZERO; WIDTH];
    state[0] = composer.append_constant(BlsScalar::from(tag(A, dom_sep)));

    messages.chunks(WIDTH - 1).for_each(|chunk| {
        state[1..].iter_mut().zip(chunk.iter()).for_each(|(s, c)| {
            let constraint = Constraint::new().left(1).a(*s).right(1).b(*c);
            *s = composer.gate_add(constraint);
        });
        GadgetStrategy::gadget(composer, &mut state);
    });

    state[1]
}

/// Mirror of [`hash_one`](super::hash_one) inside of a PLONK circuit.
pub fn hash_one_gadget<C>(composer: &mut C, x: Witness) -> Witness
where
    C: Composer,
{
    fixed_gadget(composer, NULLIFIER_DOMAIN, &[x])
}

/// Mirror of [`hash_two`](super::hash_two) inside of a PLONK circuit.
pub fn hash_two_gadget<C>(composer: &mut C, a: Witness, b: Witness) -> Witness
where
    C: Composer,
{
    fixed_gadget(composer, NODE_DOMAIN, &[a, b])
}

/// Mirror of [`hash_commitment`](super::hash_commitment) inside of a PLONK
/// circuit.
pub fn hash_commitment_gadget<C>(
    composer: &mut C,
    nullifier: Witness,
    secret: Witness,
) -> Witness
where
    C: Composer,
{
    fixed_gadget(composer, COMMITMENT_DOMAIN, &[nullifier, secret])
}
