//! MQTT topic filter matching (`+` single-segment, `#` multi-segment tail).

/// Does `filter` match `topic`, per MQTT 3.1.1 §4.7?
///
/// `+` matches exactly one segment; `#` may appear only as the final
/// segment and matches zero or more remaining segments (so `sport/#`
/// matches both `sport/tennis` and `sport` itself).
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut f = filter.split('/');
    let mut t = topic.split('/');

    loop {
        match (f.next(), t.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some("+"), None) => return false,
            (Some(fs), Some(ts)) => {
                if fs != ts {
                    return false;
                }
            }
            (Some(_), None) => return false,
            (None, Some(_)) => return false,
            (None, None) => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches("sensors/temp", "sensors/temp"));
        assert!(!matches("sensors/temp", "sensors/humidity"));
    }

    #[test]
    fn plus_matches_one_segment() {
        assert!(matches("sport/+/score", "sport/tennis/score"));
        assert!(!matches("sport/+/score", "sport/tennis/player1/score"));
    }

    #[test]
    fn hash_matches_remaining_segments_including_none() {
        assert!(matches("sport/#", "sport/tennis"));
        assert!(matches("sport/#", "sport"));
        assert!(matches("sport/tennis/#", "sport/tennis"));
    }

    #[test]
    fn identity_law_for_wildcard_free_single_segment() {
        assert!(matches("status", "status"));
    }
}
