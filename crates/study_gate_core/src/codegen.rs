//! crates/study_gate_core/src/codegen.rs
//!
//! Bulk generation of unique access codes by rejection sampling.

use rand::Rng;
use std::collections::HashSet;

use crate::ports::{PortError, PortResult};

/// Uppercase ASCII letters followed by digits.
pub const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const DEFAULT_CODE_LENGTH: usize = 4;
pub const DEFAULT_POOL_SIZE: usize = 10_000;

/// Upper bound on random draws, as a multiple of the requested pool size.
/// Filling even the whole code space needs far fewer draws than this.
const DRAWS_PER_CODE: u64 = 64;
const MIN_DRAW_BUDGET: u64 = 4_096;

/// Canonical form of user-entered code text.
pub fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Shape of a code pool: how many codes, and how long each one is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSpec {
    pub count: usize,
    pub length: usize,
}

impl Default for CodeSpec {
    fn default() -> Self {
        Self {
            count: DEFAULT_POOL_SIZE,
            length: DEFAULT_CODE_LENGTH,
        }
    }
}

impl CodeSpec {
    /// Number of distinct codes of this length, or `None` if it overflows `u64`.
    pub fn capacity(&self) -> Option<u64> {
        (ALPHABET.len() as u64).checked_pow(u32::try_from(self.length).ok()?)
    }

    /// True if `code` (already normalized) has this spec's length and alphabet.
    pub fn matches(&self, code: &str) -> bool {
        code.len() == self.length && code.bytes().all(|b| ALPHABET.contains(&b))
    }
}

/// A freshly generated set of unique codes, in generation order.
#[derive(Debug, Clone)]
pub struct CodePool {
    codes: Vec<String>,
}

impl CodePool {
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// The plain-text export: every code, sorted, one per line.
    pub fn export_text(&self) -> String {
        let mut sorted: Vec<&str> = self.codes.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        let mut out = sorted.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn into_codes(self) -> Vec<String> {
        self.codes
    }
}

/// Generates code pools for a fixed `CodeSpec`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeGenerator {
    spec: CodeSpec,
}

impl CodeGenerator {
    pub fn new(spec: CodeSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> CodeSpec {
        self.spec
    }

    /// Generates a pool using the thread-local RNG.
    pub fn generate(&self) -> PortResult<CodePool> {
        self.generate_with(&mut rand::thread_rng())
    }

    /// Generates a pool from `rng`.
    ///
    /// Fails with `CapacityExhausted` before drawing anything if the pool cannot
    /// fit in the code space, and also if the draw budget runs out.
    pub fn generate_with<R: Rng>(&self, rng: &mut R) -> PortResult<CodePool> {
        let requested = self.spec.count as u64;
        let capacity = self.spec.capacity().unwrap_or(u64::MAX);
        if requested > capacity {
            return Err(PortError::CapacityExhausted {
                requested,
                capacity,
            });
        }

        let budget = requested
            .saturating_mul(DRAWS_PER_CODE)
            .max(MIN_DRAW_BUDGET);
        let mut seen: HashSet<String> = HashSet::with_capacity(self.spec.count);
        let mut codes = Vec::with_capacity(self.spec.count);
        let mut draws: u64 = 0;

        while codes.len() < self.spec.count {
            if draws == budget {
                return Err(PortError::CapacityExhausted {
                    requested,
                    capacity,
                });
            }
            draws += 1;

            let candidate = self.draw(rng);
            if seen.insert(candidate.clone()) {
                codes.push(candidate);
            }
        }

        tracing::debug!(generated = codes.len(), draws, "Code pool generated");
        Ok(CodePool { codes })
    }

    fn draw<R: Rng>(&self, rng: &mut R) -> String {
        (0..self.spec.length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}
