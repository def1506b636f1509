use super::types::Band;
use serde::Serialize;

/// `iw dev wlan0 scan` output with three visible networks.
pub const SAMPLE_SCAN_DUMP: &str = "BSS aa:bb:cc:dd:ee:ff(on wlan0)
\tfreq: 5180
\tsignal: -52.00 dBm
\tSSID: HomeNetwork
\tcapability: ESS Privacy ShortSlotTime (0x0411)
BSS 11:22:33:44:55:00(on wlan0)
\tfreq: 2437
\tsignal: -71.00 dBm
\tSSID: NeighboursWifi
\tcapability: ESS Privacy (0x0011)
BSS de:ad:be:ef:00:01(on wlan0)
\tfreq: 2412
\tsignal: -85.00 dBm
\tSSID: OpenCafe
\tcapability: ESS (0x0001)
";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScannedNetwork {
    pub ssid: String,
    /// dBm
    pub signal: i32,
    pub frequency: Band,
    pub encrypted: bool,
    pub mac: String,
}

/// Parses an `iw dev <if> scan` dump.
///
/// Lines before the first `BSS` header and unknown attributes are ignored.
pub fn parse_scan_dump(dump: &str) -> Vec<ScannedNetwork> {
    let mut networks = Vec::new();
    let mut current: Option<ScannedNetwork> = None;

    for line in dump.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("BSS ") {
            networks.extend(current.take());

            let mac = rest.split('(').next().unwrap_or_default().trim();
            current = Some(ScannedNetwork {
                ssid: String::new(),
                signal: 0,
                frequency: Band::Ghz2_4,
                encrypted: false,
                mac: mac.to_string(),
            });
            continue;
        }

        let Some(network) = current.as_mut() else {
            continue;
        };

        if let Some(ssid) = line.strip_prefix("SSID:") {
            network.ssid = ssid.trim().to_string();
        } else if let Some(signal) = line.strip_prefix("signal:") {
            network.signal = leading_number(signal).map_or(0, |dbm| dbm.round() as i32);
        } else if let Some(freq) = line.strip_prefix("freq:") {
            if let Some(mhz) = leading_number(freq) {
                network.frequency = Band::from_frequency(mhz as u32);
            }
        } else if line.starts_with("capability:") && line.contains("Privacy") {
            network.encrypted = true;
        } else if line.starts_with("RSN:") || line.starts_with("WPA:") {
            network.encrypted = true;
        }
    }

    networks.extend(current);
    networks
}

fn leading_number(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}
