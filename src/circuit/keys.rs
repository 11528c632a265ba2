// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use dusk_bytes::{DeserializableSlice, Serializable};
use dusk_plonk::prelude::*;
use rand_core::{CryptoRng, OsRng, RngCore};
use tracing::debug;

use super::{
    CircuitError, ProofVerifier, PublicInputs, VoteCircuit, VoteProof,
    VoteProver, VoteWitness, CAPACITY, LABEL,
};

/// Prover and verifier keys of [`VoteCircuit`].
pub struct VoteKeys {
    /// Proving half.
    pub prover: PlonkVoteProver,
    /// Verifying half.
    pub verifier: PlonkVoteVerifier,
}

impl VoteKeys {
    /// Generate fresh public parameters and compile the circuit against
    /// them.
    ///
    /// This is a trusted setup: whoever knows the randomness can forge
    /// proofs. It is meant for tests and local deployments.
    pub fn setup<R>(rng: &mut R) -> Result<Self, CircuitError>
    where
        R: RngCore + CryptoRng,
    {
        let pp = PublicParameters::setup(1 << CAPACITY, rng)?;
        Self::compile(&pp)
    }

    /// Compile the circuit against existing public parameters.
    pub fn compile(pp: &PublicParameters) -> Result<Self, CircuitError> {
        let (prover, verifier) = Compiler::compile::<VoteCircuit>(pp, LABEL)?;
        let verifier = PlonkVoteVerifier(Arc::new(verifier));

        debug!("vote circuit compiled");

        Ok(Self {
            prover: PlonkVoteProver {
                prover,
                verifier: verifier.clone(),
            },
            verifier,
        })
    }
}

/// [`VoteProver`] backed by the PLONK prover of [`VoteCircuit`].
pub struct PlonkVoteProver {
    prover: Prover,
    verifier: PlonkVoteVerifier,
}

impl VoteProver for PlonkVoteProver {
    fn prove(&self, witness: &VoteWitness) -> Result<VoteProof, CircuitError> {
        witness.check()?;

        let circuit = VoteCircuit::from(witness);
        let (proof, public_inputs) = self.prover.prove(&mut OsRng, &circuit)?;

        // the public inputs come out of the circuit in the order they were
        // appended, anything else is a bug in the circuit
        if public_inputs[..] != witness.public().to_scalars()[..] {
            return Err(CircuitError::InvalidProof);
        }

        let proof = VoteProof {
            proof: proof.to_bytes().to_vec(),
            public: *witness.public(),
        };
        self.verifier.verify(&proof.proof, &proof.public)?;

        debug!(
            depth = proof.public.depth,
            size = proof.proof.len(),
            "vote proof generated"
        );

        Ok(proof)
    }
}

/// [`ProofVerifier`] backed by the PLONK verifier of [`VoteCircuit`].
#[derive(Clone)]
pub struct PlonkVoteVerifier(Arc<Verifier>);

impl ProofVerifier for PlonkVoteVerifier {
    fn verify(
        &self,
        proof: &[u8],
        public: &PublicInputs,
    ) -> Result<(), CircuitError> {
        let proof =
            Proof::from_slice(proof).map_err(|_| CircuitError::MalformedProof)?;

        self.0
            .verify(&proof, &public.to_scalars())
            .map_err(|_| CircuitError::InvalidProof)
    }
}
