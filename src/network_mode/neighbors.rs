/// `ip neigh show` output with three clients on `wlan0` and one wired host.
pub const SAMPLE_NEIGHBOR_TABLE: &str = "192.168.100.50 dev wlan0 lladdr a1:b2:c3:d4:e5:f6 REACHABLE
192.168.100.51 dev wlan0 lladdr de:ad:be:ef:ca:fe STALE
192.168.100.52 dev wlan0 lladdr 11:22:33:44:55:66 REACHABLE
10.0.0.1 dev eth0 lladdr 00:11:22:33:44:55 REACHABLE
";

/// Counts resolved neighbor entries on `interface`.
///
/// Entries without a link-layer address (`FAILED`, `INCOMPLETE`) are skipped.
pub fn count_neighbors(table: &str, interface: &str) -> usize {
    table
        .lines()
        .filter(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let on_interface = fields
                .windows(2)
                .any(|pair| pair[0] == "dev" && pair[1] == interface);
            on_interface && fields.contains(&"lladdr")
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_matching_interface() {
        assert_eq!(count_neighbors(SAMPLE_NEIGHBOR_TABLE, "wlan0"), 3);
        assert_eq!(count_neighbors(SAMPLE_NEIGHBOR_TABLE, "eth0"), 1);
    }

    #[test]
    fn interface_prefix_does_not_match() {
        let table = "192.168.200.10 dev wlan0_ap lladdr a1:b2:c3:d4:e5:f6 REACHABLE\n";

        assert_eq!(count_neighbors(table, "wlan0"), 0);
        assert_eq!(count_neighbors(table, "wlan0_ap"), 1);
    }

    #[test]
    fn unresolved_entries_are_skipped() {
        let table = "192.168.100.60 dev wlan0 FAILED\n192.168.100.61 dev wlan0 INCOMPLETE\n";

        assert_eq!(count_neighbors(table, "wlan0"), 0);
    }
}
