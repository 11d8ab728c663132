// SPDX-License-Identifier: Apache-2.0
//! Deterministic numerics substrate (§4.1): Q16.16 fixed point, transcendental
//! LUTs, the Van-Genuchten retention tables, the xorshift64* PRNG, and
//! barrier-potential helpers. Nothing here calls a platform transcendental
//! or platform RNG from inside the simulation loop.

pub mod barrier;
pub mod fixed;
pub mod rng;
pub mod trig;
pub mod van_genuchten;

pub use fixed::Fixed;
pub use rng::Xorshift64Star;
