//! Peripheral selection during discovery.

use crate::domain::models::{normalize_address, DiscoveredPeripheral};

/// Which detector to connect to. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCriteria {
    pub name: Option<String>,
    pub address: Option<String>,
}

impl SelectionCriteria {
    pub fn new(name: Option<&str>, address: Option<&str>) -> Self {
        let set = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Self {
            name: set(name),
            address: set(address).map(|a| normalize_address(&a)),
        }
    }

    /// Both name and address set: both must match. One set: that one must match.
    /// Neither set: any peripheral offering the service is accepted.
    pub fn matches(&self, peripheral: &DiscoveredPeripheral) -> bool {
        let name_matches = |want: &String| peripheral.local_name.as_deref() == Some(want.as_str());
        let address_matches = |want: &String| normalize_address(&peripheral.address) == *want;

        match (&self.name, &self.address) {
            (Some(name), Some(address)) => name_matches(name) && address_matches(address),
            (Some(name), None) => name_matches(name),
            (None, Some(address)) => address_matches(address),
            (None, None) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::PeripheralId;

    fn peripheral(address: &str, name: Option<&str>) -> DiscoveredPeripheral {
        DiscoveredPeripheral {
            id: PeripheralId(address.to_string()),
            address: address.to_string(),
            local_name: name.map(String::from),
        }
    }

    #[test]
    fn test_name_only() {
        let criteria = SelectionCriteria::new(Some("CT-F-54"), None);
        assert!(criteria.matches(&peripheral("aa:bb", Some("CT-F-54"))));
        assert!(!criteria.matches(&peripheral("aa:bb", Some("CT-F-99"))));
        assert!(!criteria.matches(&peripheral("aa:bb", None)));
    }

    #[test]
    fn test_address_only_is_normalized() {
        let criteria = SelectionCriteria::new(None, Some("AA:BB:CC:DD:EE:FF"));
        assert!(criteria.matches(&peripheral("aabbccddeeff", Some("anything"))));
        assert!(criteria.matches(&peripheral("AA-BB-CC-DD-EE-FF", None)));
        assert!(!criteria.matches(&peripheral("aabbccddee00", Some("CT-F-54"))));
    }

    #[test]
    fn test_name_and_address_both_required() {
        let criteria = SelectionCriteria::new(Some("CT-F-54"), Some("aabbccddeeff"));
        assert!(criteria.matches(&peripheral("aabbccddeeff", Some("CT-F-54"))));
        assert!(!criteria.matches(&peripheral("aabbccddeeff", Some("CT-F-99"))));
        assert!(!criteria.matches(&peripheral("001122334455", Some("CT-F-54"))));
    }

    #[test]
    fn test_unconfigured_accepts_anything() {
        let criteria = SelectionCriteria::new(None, Some("  "));
        assert_eq!(criteria, SelectionCriteria::default());
        assert!(criteria.matches(&peripheral("001122334455", None)));
        assert!(criteria.matches(&peripheral("001122334455", Some("XYZ"))));
    }
}
