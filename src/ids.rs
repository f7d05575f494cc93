use rand::seq::SliceRandom;
use rand::Rng;

pub const ACCOUNT_NUMBER_LEN: usize = 16;
pub const VOUCHER_CODE_LEN: usize = 16;

const VOUCHER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const NAME_ADJECTIVES: &[&str] = &[
    "agile", "bold", "brave", "bright", "calm", "clever", "cuddly", "curious", "daring", "eager",
    "fancy", "fluffy", "gentle", "happy", "jolly", "keen", "lively", "lucky", "merry", "mighty",
    "nimble", "proud", "quick", "quiet", "rapid", "shy", "sleepy", "snappy", "sunny", "swift",
    "tidy", "witty",
];

const NAME_ANIMALS: &[&str] = &[
    "badger", "beaver", "bison", "camel", "cobra", "crane", "eagle", "falcon", "ferret", "gecko",
    "heron", "ibex", "jackal", "koala", "lemur", "lynx", "marmot", "moose", "newt", "otter",
    "panda", "puffin", "quokka", "raven", "seal", "sloth", "tapir", "tiger", "walrus", "wombat",
    "yak", "zebra",
];

/// 16 independently uniform decimal digits.
pub fn generate_account_number() -> String {
    let mut rng = rand::thread_rng();
    (0..ACCOUNT_NUMBER_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

pub fn is_valid_account_number(number: &str) -> bool {
    number.len() == ACCOUNT_NUMBER_LEN && number.bytes().all(|b| b.is_ascii_digit())
}

/// 16 characters drawn from `A-Z0-9`.
pub fn generate_voucher_code() -> String {
    let mut rng = rand::thread_rng();
    (0..VOUCHER_CODE_LEN)
        .map(|_| char::from(VOUCHER_ALPHABET[rng.gen_range(0..VOUCHER_ALPHABET.len())]))
        .collect()
}

/// Codes are handed out grouped (`ABCD-EFGH-...`); storage keeps the bare form.
pub fn normalize_voucher_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Human-friendly device label such as `"cuddly otter"`.
pub fn generate_device_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = NAME_ADJECTIVES.choose(&mut rng).copied().unwrap_or("nameless");
    let animal = NAME_ANIMALS.choose(&mut rng).copied().unwrap_or("device");
    format!("{adjective} {animal}")
}
