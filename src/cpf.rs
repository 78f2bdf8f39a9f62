//! CPF (Cadastro de Pessoas Físicas) checksum validation.
//!
//! A CPF is eleven digits where the last two are check digits computed from
//! the first nine (and ten) with descending weights modulo 11. Formatting
//! characters such as `.` and `-` are ignored.

const CPF_LEN: usize = 11;

/// Keep only the ASCII digits of the input.
#[must_use]
pub fn normalize(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Returns `true` when `input` holds a CPF whose two check digits match.
#[must_use]
pub fn is_valid_cpf(input: &str) -> bool {
    let digits: Vec<u32> = input.chars().filter_map(|c| c.to_digit(10)).collect();

    if digits.len() != CPF_LEN {
        return false;
    }

    // Sequences like 000.000.000-00 satisfy the checksum but are never issued.
    if digits.iter().all(|&digit| digit == digits[0]) {
        return false;
    }

    check_digit(&digits[..9]) == digits[9] && check_digit(&digits[..10]) == digits[10]
}

/// Weighted sum with weights `len + 1 ..= 2`, reduced as `(sum * 10) % 11`.
fn check_digit(digits: &[u32]) -> u32 {
    let top_weight = u32::try_from(digits.len()).unwrap_or(u32::MAX).saturating_add(1);
    let sum: u32 = digits
        .iter()
        .zip((2..=top_weight).rev())
        .map(|(digit, weight)| digit * weight)
        .sum();

    match (sum * 10) % 11 {
        10 | 11 => 0,
        remainder => remainder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_valid_formatted() {
        assert!(is_valid_cpf("529.982.247-25"));
    }

    #[test]
    fn accepts_known_valid_digits_only() {
        assert!(is_valid_cpf("52998224725"));
        assert!(is_valid_cpf("11144477735"));
    }

    #[test]
    fn rejects_repeated_digits() {
        for digit in 0..=9 {
            let cpf = digit.to_string().repeat(11);
            assert!(!is_valid_cpf(&cpf), "{cpf} should be rejected");
        }
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_valid_cpf("5299822472"));
        assert!(!is_valid_cpf("529982247250"));
        assert!(!is_valid_cpf(""));
    }

    #[test]
    fn rejects_bad_check_digits() {
        assert!(!is_valid_cpf("529.982.247-24"));
        assert!(!is_valid_cpf("529.982.247-15"));
    }

    #[test]
    fn validity_depends_only_on_check_digits() {
        // For a fixed 9-digit body exactly one pair of check digits is valid.
        let body = "529982247";
        let valid: Vec<String> = (0..100)
            .map(|suffix| format!("{body}{suffix:02}"))
            .filter(|candidate| is_valid_cpf(candidate))
            .collect();
        assert_eq!(valid, vec!["52998224725".to_string()]);
    }

    #[test]
    fn check_digit_maps_ten_to_zero() {
        // 100.000.000 -> sum 10, (10 * 10) % 11 = 1
        assert_eq!(check_digit(&[1, 0, 0, 0, 0, 0, 0, 0, 0]), 1);
        // last slot has weight 2 -> sum 2 -> 20 % 11 = 9
        assert_eq!(check_digit(&[0, 0, 0, 0, 0, 0, 0, 0, 1]), 9);
        // sum 1 * 10 + 8 * 9 = 82 -> 820 % 11 = 6
        assert_eq!(check_digit(&[1, 8, 0, 0, 0, 0, 0, 0, 0]), 6);
        // sum 6 * 2 = 12 -> 120 % 11 = 10 -> 0
        assert_eq!(check_digit(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 6]), 0);
    }

    #[test]
    fn normalize_strips_formatting() {
        assert_eq!(normalize("529.982.247-25"), "52998224725");
        assert_eq!(normalize(" 12a3 "), "123");
    }
}
