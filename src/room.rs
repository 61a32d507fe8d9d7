use rand::Rng;

const CODE_LEN: usize = 4;
const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn create_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// The shared secret gating admission to the single active room.
#[derive(Debug, Clone)]
pub struct RoomCode {
    code: String,
}

impl RoomCode {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            code: create_room_code(rng),
        }
    }

    pub fn get(&self) -> &str {
        &self.code
    }

    /// Case-sensitive comparison against the current code.
    pub fn verify(&self, candidate: &str) -> bool {
        self.code == candidate
    }

    /// Replace the code with a freshly generated one that differs from the current code.
    pub fn regenerate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &str {
        loop {
            let next = create_room_code(rng);
            if next != self.code {
                self.code = next;
                return &self.code;
            }
        }
    }
}
