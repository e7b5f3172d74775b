//! Round-based compression digest used by the request signer.
//!
//! The platform's gate expects a token derived from a Merkle–Damgård-style
//! construction: the message is length-padded into 64-byte blocks and each
//! block is folded into a 4-word state over 64 rounds. Rounds 0–15 and
//! 16–63 run under two distinct constant regimes with different round
//! functions. All constants come from [`super::SigningParams`] so the whole
//! regime can be swapped when the platform rotates its scheme.

use super::SigningParams;

/// Output size of the compression digest in bytes.
pub(crate) const DIGEST_LEN: usize = 16;

/// Block size the message is padded to.
const BLOCK_LEN: usize = 64;

/// Pads `message` with a trailing `0x80`, zeros, and the 64-bit message
/// length, then folds every 64-byte block into the state.
pub(crate) fn digest(params: &SigningParams, message: &[u8]) -> [u8; DIGEST_LEN] {
    let mut padded = message.to_vec();
    let bit_len = (message.len() as u64).wrapping_mul(8);
    padded.push(0x80);
    while padded.len() % BLOCK_LEN != BLOCK_LEN - 8 {
        padded.push(0);
    }
    padded.extend_from_slice(&bit_len.to_be_bytes());

    let mut state = params.iv;
    for block in padded.chunks_exact(BLOCK_LEN) {
        compress(params, &mut state, block);
    }

    let mut out = [0u8; DIGEST_LEN];
    for (chunk, word) in out.chunks_exact_mut(4).zip(state) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    out
}

/// Folds one 64-byte block into the running state.
fn compress(params: &SigningParams, state: &mut [u32; 4], block: &[u8]) {
    let mut words = [0u32; 16];
    for (word, chunk) in words.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    let [mut a, mut b, mut c, mut d] = *state;

    for round in 0..64 {
        let (f, constant, word_index) = if round < 16 {
            // Early regime: boolean-select round function, sequential schedule.
            (
                (b & c) | (!b & d),
                params.round_constants_early[round],
                round,
            )
        } else {
            // Late regime: xor round function, strided schedule.
            (
                b ^ c ^ d,
                params.round_constants_late[round - 16],
                (5 * round + 1) % 16,
            )
        };

        let rotation = params.rotations[round % params.rotations.len()];
        let mixed = a
            .wrapping_add(f)
            .wrapping_add(words[word_index])
            .wrapping_add(constant)
            .rotate_left(rotation);

        a = d;
        d = c;
        c = b;
        b = b.wrapping_add(mixed);
    }

    state[0] = state[0].wrapping_add(a);
    state[1] = state[1].wrapping_add(b);
    state[2] = state[2].wrapping_add(c);
    state[3] = state[3].wrapping_add(d);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let params = SigningParams::default();
        assert_eq!(digest(&params, b"hello"), digest(&params, b"hello"));
    }

    #[test]
    fn test_digest_differs_per_message() {
        let params = SigningParams::default();
        assert_ne!(digest(&params, b"hello"), digest(&params, b"hellp"));
    }

    #[test]
    fn test_digest_length_extension_padding() {
        // Messages around the 55/56-byte padding boundary must still digest
        // (one extra block is appended for the length suffix).
        let params = SigningParams::default();
        for len in [0, 1, 55, 56, 57, 63, 64, 65, 127, 128] {
            let message = vec![0xAB; len];
            let out = digest(&params, &message);
            assert_eq!(out.len(), DIGEST_LEN, "len {len}");
        }
    }

    #[test]
    fn test_digest_sensitive_to_constants() {
        let defaults = SigningParams::default();
        let mut altered = SigningParams::default();
        altered.round_constants_late[0] ^= 1;
        assert_ne!(digest(&defaults, b"input"), digest(&altered, b"input"));
    }
}
