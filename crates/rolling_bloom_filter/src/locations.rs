// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Deterministic derivation of bit indices from strings.

use std::sync::LazyLock;

use rapidhash::v3::{RapidSecrets, rapidhash_v3_seeded};

// Every process in the fleet must hash with the same secrets, otherwise the
// bit positions written to the shared store stop lining up.
const LOCATION_SEED: u64 = 0x6c6f_6361_7469_6f6e;

static SECRETS: LazyLock<RapidSecrets> = LazyLock::new(|| RapidSecrets::seed(LOCATION_SEED));

/// Maps `s` to `k` bit indices in `[0, m)`.
///
/// Location `i` is the hash of the UTF-8 bytes of `s` extended by the bytes
/// `0, 1, …, i - 1`, reduced mod `m` (extend-and-rehash derivation). The
/// mapping is a pure function of `(s, m, k)`: identical inputs yield identical
/// index sequences across processes and restarts.
pub(crate) fn locations(s: &str, m: usize, k: usize) -> Vec<usize> {
    debug_assert!(m > 0, "modulus must be positive");

    let mut input = Vec::with_capacity(s.len().saturating_add(k));
    input.extend_from_slice(s.as_bytes());

    let mut output = Vec::with_capacity(k);
    for i in 0..k {
        let sum = rapidhash_v3_seeded(&input, &SECRETS);
        output.push((sum % m as u64) as usize);

        // Append a byte so the next iteration sees a different input.
        input.push(i as u8);
    }

    output
}
