//! Pseudonym generation for anonymised send (spec.md §4.B): fresh DICOM
//! UIDs, demographically plausible synthesized names, zeroed birth dates.

use rand::Rng;

/// DICOM organisation root used for freshly minted UIDs. Not registered;
/// anonymised data never leaves the pseudonym namespace it was created in.
const PSEUDONYM_UID_ROOT: &str = "2.25";

/// Biological sex as recorded in the DICOM `PatientSex` tag, used to pick a
/// plausible synthesized given name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    pub fn from_dicom_code(code: &str) -> Self {
        match code {
            "M" => Self::Male,
            "F" => Self::Female,
            _ => Self::Other,
        }
    }
}

/// Ten-year age bucket, e.g. `AgeBucket(4)` covers 40-49.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBucket(pub u8);

impl AgeBucket {
    /// Derive a bucket from a DICOM `PatientAge` value like `"034Y"`.
    pub fn from_dicom_age(age: &str) -> Option<Self> {
        let digits: String = age.chars().take_while(|c| c.is_ascii_digit()).collect();
        let years: u32 = digits.parse().ok()?;
        Some(Self((years / 10) as u8))
    }
}

/// A fresh, DICOM-valid UID: `2.25.<random decimal body>`, bounded to the
/// 64-character limit the standard places on UI-type values.
pub fn generate_uid() -> String {
    let mut rng = rand::thread_rng();
    let body: u128 = rng.gen();
    let mut uid = format!("{PSEUDONYM_UID_ROOT}.{body}");
    uid.truncate(64);
    uid
}

/// Synthesize a demographically plausible `PatientName` (DICOM `PN` format
/// `Family^Given`) from sex and age bucket, so anonymised studies remain
/// usable for cohort-level review without identifying the patient.
pub fn synthesize_patient_name(sex: Sex, age_bucket: AgeBucket) -> String {
    let given = match sex {
        Sex::Male => "Alex",
        Sex::Female => "Morgan",
        Sex::Other => "Sam",
    };
    format!("Anon{}^{given}", age_bucket.0 * 10)
}

/// `PatientBirthDate` is always zeroed on anonymisation (spec.md §4.B).
pub fn zeroed_birth_date() -> String {
    "00000000".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uids_are_unique_and_bounded() {
        let a = generate_uid();
        let b = generate_uid();
        assert_ne!(a, b);
        assert!(a.len() <= 64);
        assert!(a.starts_with("2.25."));
    }

    #[test]
    fn age_bucket_parses_dicom_age() {
        assert_eq!(AgeBucket::from_dicom_age("034Y"), Some(AgeBucket(3)));
        assert_eq!(AgeBucket::from_dicom_age("009Y"), Some(AgeBucket(0)));
        assert_eq!(AgeBucket::from_dicom_age("bogus"), None);
    }

    #[test]
    fn synthesized_names_vary_by_sex() {
        let male = synthesize_patient_name(Sex::Male, AgeBucket(4));
        let female = synthesize_patient_name(Sex::Female, AgeBucket(4));
        assert_ne!(male, female);
        assert!(male.starts_with("Anon40^"));
    }
}
