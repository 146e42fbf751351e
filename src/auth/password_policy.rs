/*!
 * # Password Policy Module
 *
 * Complexity requirements applied to new account passwords. Registration
 * reports every unmet requirement at once, so the primary API returns the
 * full violation list rather than failing on the first rule.
 */

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PasswordPolicyError {
    #[error("Password must be at least {min_length} characters long")]
    TooShort { min_length: usize },

    #[error("Password must contain at least one uppercase letter")]
    MissingUppercase,

    #[error("Password must contain at least one lowercase letter")]
    MissingLowercase,

    #[error("Password must contain at least one number")]
    MissingNumber,
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
        }
    }
}

impl PasswordPolicy {
    /// Returns every rule the password fails, in declaration order. An
    /// empty vec means the password is acceptable.
    pub fn violations(&self, password: &str) -> Vec<PasswordPolicyError> {
        let mut violations = Vec::new();

        if password.chars().count() < self.min_length {
            violations.push(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }

        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            violations.push(PasswordPolicyError::MissingUppercase);
        }

        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            violations.push(PasswordPolicyError::MissingLowercase);
        }

        if self.require_numbers && !password.chars().any(|c| c.is_numeric()) {
            violations.push(PasswordPolicyError::MissingNumber);
        }

        violations
    }

    /// Validate a password, failing on the first unmet rule.
    pub fn validate(&self, password: &str) -> Result<(), PasswordPolicyError> {
        match self.violations(password).into_iter().next() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Passw0rd" ; "exactly eight chars with all classes")]
    #[test_case("CorrectHorse7" ; "longer mixed password")]
    #[test_case("A1b2C3d4" ; "alternating classes")]
    fn accepts_conforming_passwords(password: &str) {
        let policy = PasswordPolicy::default();
        assert!(policy.violations(password).is_empty());
        assert!(policy.validate(password).is_ok());
    }

    #[test_case("Ab1", &[PasswordPolicyError::TooShort { min_length: 8 }] ; "short but all classes")]
    #[test_case("password1", &[PasswordPolicyError::MissingUppercase] ; "no uppercase")]
    #[test_case("PASSWORD1", &[PasswordPolicyError::MissingLowercase] ; "no lowercase")]
    #[test_case("Passwords", &[PasswordPolicyError::MissingNumber] ; "no digit")]
    fn reports_single_violation(password: &str, expected: &[PasswordPolicyError]) {
        let policy = PasswordPolicy::default();
        assert_eq!(policy.violations(password), expected);
    }

    #[test]
    fn reports_every_violation_at_once() {
        let policy = PasswordPolicy::default();
        let violations = policy.violations("abc");
        assert_eq!(
            violations,
            vec![
                PasswordPolicyError::TooShort { min_length: 8 },
                PasswordPolicyError::MissingUppercase,
                PasswordPolicyError::MissingNumber,
            ]
        );
    }

    #[test]
    fn validate_surfaces_first_violation() {
        let policy = PasswordPolicy::default();
        assert_eq!(
            policy.validate("abc"),
            Err(PasswordPolicyError::TooShort { min_length: 8 })
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let policy = PasswordPolicy::default();
        // Eight characters, more than eight bytes.
        assert!(policy.violations("Pässw0rd").is_empty());
    }
}
