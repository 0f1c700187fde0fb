// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-text and JSON rendering for command output.

use std::fmt::Write as _;

use serde::Serialize;

use tinta_core::human_errors::HumanError;
use tinta_core::types::{Endpoint, Origin};

/// One line per printer: address, origin, name.
pub fn device_table(devices: &[Endpoint]) -> String {
    if devices.is_empty() {
        return "No printers known.\n".to_owned();
    }
    let mut out = String::new();
    for ep in devices {
        let origin = match ep.origin {
            Origin::Paired => "paired",
            Origin::Discovered => "found",
            Origin::Manual => "manual",
        };
        let _ = writeln!(out, "{}  {:<7} {}", ep.address, origin, ep.display_name);
    }
    out
}

/// Pretty JSON, or the serializer's complaint.
pub fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

/// Classic 16-bytes-per-line hex dump with an ASCII column.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", row * 16);
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, "{b:02x} ");
                }
                None => out.push_str("   "),
            }
            if i == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }
    out
}

/// Error text for the terminal: heading, then what to try.
pub fn human(err: &HumanError) -> String {
    format!("Error: {}\n  {}", err.message, err.suggestion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinta_core::types::Address;

    #[test]
    fn table_lists_each_printer() {
        let devices = vec![
            Endpoint::paired(Address::parse("00:11:62:00:00:01").unwrap(), "Kitchen"),
            Endpoint::discovered(Address::parse("00:11:62:00:00:02").unwrap(), None),
        ];
        let table = device_table(&devices);
        assert_eq!(table.lines().count(), 2);
        assert!(table.contains("paired  Kitchen"));
        assert!(table.lines().nth(1).unwrap().ends_with("00:11:62:00:00:02"));
    }

    #[test]
    fn empty_table_says_so() {
        assert_eq!(device_table(&[]), "No printers known.\n");
    }

    #[test]
    fn hex_dump_shows_offsets_and_ascii() {
        let dump = hex_dump(b"\x1b@HELLO\n");
        assert!(dump.starts_with("00000000  1b 40 48 45 4c 4c 4f 0a "));
        assert!(dump.trim_end().ends_with("|.@HELLO.|"));
    }

    #[test]
    fn hex_dump_wraps_at_sixteen() {
        let dump = hex_dump(&[0u8; 17]);
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.lines().nth(1).unwrap().starts_with("00000010  00"));
    }
}
