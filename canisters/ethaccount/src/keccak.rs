//! One-shot Keccak-256, carried in-tree to keep the wasm module lean.
//! This is the pre-NIST padding variant (0x01), not SHA-3 (0x06).

const ROUND_CONSTANTS: [u64; 24] = [
    0x0000000000000001,
    0x0000000000008082,
    0x800000000000808a,
    0x8000000080008000,
    0x000000000000808b,
    0x0000000080000001,
    0x8000000080008081,
    0x8000000000008009,
    0x000000000000008a,
    0x0000000000000088,
    0x0000000080008009,
    0x000000008000000a,
    0x000000008000808b,
    0x800000000000008b,
    0x8000000000008089,
    0x8000000000008003,
    0x8000000000008002,
    0x8000000000000080,
    0x000000000000800a,
    0x800000008000000a,
    0x8000000080008081,
    0x8000000000008080,
    0x0000000080000001,
    0x8000000080008008,
];

const ROTATIONS: [u32; 24] = [
    1, 3, 6, 10, 15, 21, 28, 36, 45, 55, 2, 14, 27, 41, 56, 8, 25, 43, 62, 18, 39, 61, 20, 44,
];

const PI_LANES: [usize; 24] = [
    10, 7, 11, 17, 18, 3, 5, 16, 8, 21, 24, 4, 15, 23, 19, 13, 12, 2, 20, 14, 22, 9, 6, 1,
];

const RATE: usize = 136;

fn permute(state: &mut [u64; 25]) {
    let mut parity = [0u64; 5];
    for &rc in ROUND_CONSTANTS.iter() {
        // theta
        for i in 0..5 {
            parity[i] = state[i] ^ state[i + 5] ^ state[i + 10] ^ state[i + 15] ^ state[i + 20];
        }
        for i in 0..5 {
            let t = parity[(i + 4) % 5] ^ parity[(i + 1) % 5].rotate_left(1);
            for j in (0..25).step_by(5) {
                state[i + j] ^= t;
            }
        }
        // rho + pi
        let mut carry = state[1];
        for i in 0..24 {
            let lane = PI_LANES[i];
            let tmp = state[lane];
            state[lane] = carry.rotate_left(ROTATIONS[i]);
            carry = tmp;
        }
        // chi
        for j in (0..25).step_by(5) {
            for i in 0..5 {
                parity[i] = state[j + i];
            }
            for i in 0..5 {
                state[j + i] ^= (!parity[(i + 1) % 5]) & parity[(i + 2) % 5];
            }
        }
        state[0] ^= rc;
    }
}

fn absorb(state: &mut [u64; 25], block: &[u8]) {
    for (i, chunk) in block.chunks(8).enumerate() {
        let mut lane = [0u8; 8];
        lane[..chunk.len()].copy_from_slice(chunk);
        state[i] ^= u64::from_le_bytes(lane);
    }
}

pub fn keccak256(input: &[u8]) -> [u8; 32] {
    let mut state = [0u64; 25];
    let mut chunks = input.chunks_exact(RATE);
    for block in &mut chunks {
        absorb(&mut state, block);
        permute(&mut state);
    }

    let remainder = chunks.remainder();
    let mut block = [0u8; RATE];
    block[..remainder.len()].copy_from_slice(remainder);
    block[remainder.len()] = 0x01;
    block[RATE - 1] |= 0x80;
    absorb(&mut state, &block);
    permute(&mut state);

    // 32 output bytes fit inside a single rate block
    let mut out = [0u8; 32];
    for (i, chunk) in out.chunks_exact_mut(8).enumerate() {
        chunk.copy_from_slice(&state[i].to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470",
        );
        assert_eq!(
            hex::encode(keccak256(b"abc")),
            "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45",
        );
        assert_eq!(
            hex::encode(keccak256(b"hello")),
            "1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8",
        );
        assert_eq!(
            hex::encode(keccak256(b"The quick brown fox jumps over the lazy dog")),
            "4d741b6f1eb29cb2a9b9911c82f56fa8d73b04959d3d9d222895df6c0b28aa15",
        );
    }

    #[test]
    fn deterministic_across_calls() {
        let input = vec![0xabu8; 500];
        assert_eq!(keccak256(&input), keccak256(&input));
    }
}
