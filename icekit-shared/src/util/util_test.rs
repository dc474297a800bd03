use super::*;

#[test]
fn test_match_stun() {
    let tests = vec![
        (vec![], false),
        (vec![0x00, 0x01], true),
        (vec![0x03], true),
        (vec![0x04], false),
        (vec![0x16, 0xfe, 0xfd], false),
        (vec![0x80, 0x60], false),
    ];

    for (buf, want) in tests {
        assert_eq!(match_stun(&buf), want, "match_stun({buf:?})");
    }
}

#[test]
fn test_generate_crypto_random_string() {
    let runes = b"ab";
    let s = generate_crypto_random_string(64, runes);
    assert_eq!(s.len(), 64);
    assert!(s.chars().all(|c| c == 'a' || c == 'b'), "unexpected rune in {s}");
}
