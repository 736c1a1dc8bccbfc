//! Provably-fair three-reel slots
//!
//! A spin is a pure function of `(server_seed, client_seed, nonce)`:
//! HMAC-SHA256 keyed with the server seed over `"{server_seed}:{client_seed}:{nonce}"`.
//! Reel `i` reads digest bytes `[8i, 8i + 8)` as a big-endian integer (the same value as
//! hex characters `[16i, 16i + 16)` of the hex digest), reduces it modulo the total reel
//! weight, and walks the cumulative weight table. Anyone holding the revealed server seed
//! can recompute the symbols with [`verify_spin`].

use crate::errors::{CasinoError, CasinoResult};
use crate::games::types::FairnessOverride;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

pub const REELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symbol {
    Cherry,
    Lemon,
    Orange,
    Watermelon,
    Star,
    Seven,
    Diamond,
}

/// Symbol weights; heavier symbols are more common and pay less.
pub const REEL_WEIGHTS: [(Symbol, u64); 7] = [
    (Symbol::Cherry, 30),
    (Symbol::Lemon, 25),
    (Symbol::Orange, 20),
    (Symbol::Watermelon, 15),
    (Symbol::Star, 7),
    (Symbol::Seven, 2),
    (Symbol::Diamond, 1),
];

pub fn total_weight() -> u64 {
    REEL_WEIGHTS.iter().map(|(_, weight)| weight).sum()
}

impl Symbol {
    pub fn all() -> impl Iterator<Item = Symbol> {
        REEL_WEIGHTS.iter().map(|(symbol, _)| *symbol)
    }

    /// Three-of-a-kind multiplier.
    pub fn triple_multiplier(&self) -> u64 {
        match self {
            Symbol::Cherry => 2,
            Symbol::Lemon => 3,
            Symbol::Orange => 5,
            Symbol::Watermelon => 10,
            Symbol::Star => 20,
            Symbol::Seven => 50,
            Symbol::Diamond => 100,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Symbol::Cherry => "cherry",
            Symbol::Lemon => "lemon",
            Symbol::Orange => "orange",
            Symbol::Watermelon => "watermelon",
            Symbol::Star => "star",
            Symbol::Seven => "seven",
            Symbol::Diamond => "diamond",
        };
        f.write_str(name)
    }
}

fn symbol_for(value: u64) -> Symbol {
    let mut cumulative = 0;
    for (symbol, weight) in REEL_WEIGHTS {
        cumulative += weight;
        if value < cumulative {
            return symbol;
        }
    }
    Symbol::Diamond
}

/// Deterministic reel positions for the given seed material.
pub fn spin(server_seed: &str, client_seed: &str, nonce: u64) -> CasinoResult<[Symbol; REELS]> {
    let mut mac = HmacSha256::new_from_slice(server_seed.as_bytes())
        .map_err(|e| CasinoError::SeedRejected(e.to_string()))?;
    mac.update(format!("{}:{}:{}", server_seed, client_seed, nonce).as_bytes());
    let digest = mac.finalize().into_bytes();

    let total = total_weight();
    let mut symbols = [Symbol::Cherry; REELS];
    for (reel, symbol) in symbols.iter_mut().enumerate() {
        let mut chunk = [0u8; 8];
        chunk.copy_from_slice(&digest[reel * 8..reel * 8 + 8]);
        *symbol = symbol_for(u64::from_be_bytes(chunk) % total);
    }
    Ok(symbols)
}

pub fn verify_spin(server_seed: &str, client_seed: &str, nonce: u64, claimed: &[Symbol; REELS]) -> bool {
    spin(server_seed, client_seed, nonce).is_ok_and(|symbols| symbols == *claimed)
}

/// Fresh 32-byte server seed, hex encoded.
pub fn generate_server_seed<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 commitment to a server seed, safe to show before the spin.
pub fn server_seed_hash(server_seed: &str) -> String {
    hex::encode(Sha256::digest(server_seed.as_bytes()))
}

/// Most server seeds tried for an override before settling for a fair draw.
pub const MAX_SEED_ATTEMPTS: usize = 10_000;

/// Whether a spin satisfies an override. Every spin satisfies `None`.
pub fn satisfies(symbols: &[Symbol; REELS], fairness: FairnessOverride) -> bool {
    let [a, b, c] = *symbols;
    match fairness {
        FairnessOverride::None => true,
        FairnessOverride::ForceWin => a == b && b == c,
        FairnessOverride::ForceLoss => a != b && b != c && a != c,
    }
}

/// Server seed for the next spin. Under an override, fresh seeds are drawn until the
/// keyed spin lands in the required class, so the disclosed seed always reproduces the
/// result. Gives up after [`MAX_SEED_ATTEMPTS`] and returns a fair seed.
pub fn server_seed_for<R: Rng + ?Sized>(
    rng: &mut R,
    client_seed: &str,
    nonce: u64,
    fairness: FairnessOverride,
) -> CasinoResult<String> {
    for _ in 0..MAX_SEED_ATTEMPTS {
        let seed = generate_server_seed(rng);
        if fairness == FairnessOverride::None || satisfies(&spin(&seed, client_seed, nonce)?, fairness) {
            return Ok(seed);
        }
    }
    tracing::warn!(?fairness, nonce, "no seed matched the override, spinning fair");
    Ok(generate_server_seed(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_spin_is_deterministic() {
        let first = spin("server-seed", "42", 7).unwrap();
        for _ in 0..10 {
            assert_eq!(spin("server-seed", "42", 7).unwrap(), first);
        }
        assert!(verify_spin("server-seed", "42", 7, &first));
    }

    #[test]
    fn test_spin_depends_on_every_input() {
        let base: Vec<[Symbol; 3]> = (0..20).map(|n| spin("a", "1", n).unwrap()).collect();
        let other_client: Vec<[Symbol; 3]> = (0..20).map(|n| spin("a", "2", n).unwrap()).collect();
        let other_server: Vec<[Symbol; 3]> = (0..20).map(|n| spin("b", "1", n).unwrap()).collect();
        assert_ne!(base, other_client);
        assert_ne!(base, other_server);
    }

    #[test]
    fn test_reel_slice_matches_hex_digest() {
        let mut mac = HmacSha256::new_from_slice(b"seed").unwrap();
        mac.update(b"seed:client:3");
        let hex_digest = hex::encode(mac.finalize().into_bytes());

        let expected: Vec<Symbol> = (0..REELS)
            .map(|i| {
                let value = u64::from_str_radix(&hex_digest[i * 16..(i + 1) * 16], 16).unwrap();
                symbol_for(value % 100)
            })
            .collect();
        assert_eq!(spin("seed", "client", 3).unwrap().to_vec(), expected);
    }

    #[test]
    fn test_cumulative_table_edges() {
        assert_eq!(total_weight(), 100);
        assert_eq!(symbol_for(0), Symbol::Cherry);
        assert_eq!(symbol_for(29), Symbol::Cherry);
        assert_eq!(symbol_for(30), Symbol::Lemon);
        assert_eq!(symbol_for(97), Symbol::Seven);
        assert_eq!(symbol_for(99), Symbol::Diamond);
    }

    #[test]
    fn test_weights_shape_frequencies() {
        let mut counts = std::collections::HashMap::new();
        for nonce in 0..3_000 {
            for symbol in spin("freq", "1", nonce).unwrap() {
                *counts.entry(symbol).or_insert(0u32) += 1;
            }
        }
        assert!(counts[&Symbol::Cherry] > counts[&Symbol::Star]);
        assert!(counts[&Symbol::Star] > counts.get(&Symbol::Diamond).copied().unwrap_or(0));
    }

    #[test]
    fn test_override_seeds_reproduce_their_class() {
        let mut rng = StdRng::seed_from_u64(5);
        for nonce in 1..=50 {
            let seed = server_seed_for(&mut rng, "77", nonce, FairnessOverride::ForceWin).unwrap();
            let win = spin(&seed, "77", nonce).unwrap();
            assert!(win.iter().all(|s| *s == win[0]));
            assert!(verify_spin(&seed, "77", nonce, &win));

            let seed = server_seed_for(&mut rng, "77", nonce, FairnessOverride::ForceLoss).unwrap();
            let loss = spin(&seed, "77", nonce).unwrap();
            assert!(satisfies(&loss, FairnessOverride::ForceLoss));
        }
        // a fair seed is used as drawn
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        assert_eq!(
            server_seed_for(&mut a, "1", 1, FairnessOverride::None).unwrap(),
            generate_server_seed(&mut b)
        );
    }

    #[test]
    fn test_server_seed_commitment() {
        let mut rng = StdRng::seed_from_u64(6);
        let seed = generate_server_seed(&mut rng);
        assert_eq!(seed.len(), 64);
        assert_eq!(server_seed_hash(&seed).len(), 64);
        assert_ne!(server_seed_hash(&seed), seed);
    }
}
