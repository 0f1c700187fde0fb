// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the front end.
//
// Every technical error is mapped to plain English with a clear suggestion.
// Severity drives how the front end presents it.

use crate::error::TintaError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Link blip or timeout. Trying again is likely to work.
    Transient,
    /// User must do something (grant a permission, switch Bluetooth on).
    ActionRequired,
    /// Cannot be fixed by retrying, e.g. a wrong address.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether trying again may help.
    pub retriable: bool,
    /// Severity level.
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: impl Into<String>, retriable: bool, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable,
            severity,
        }
    }
}

/// Convert a `TintaError` into a `HumanError`.
pub fn humanize_error(err: &TintaError) -> HumanError {
    use Severity::*;

    match err {
        // -- Platform / adapter --
        TintaError::PermissionDenied(capability) => HumanError::new(
            "Bluetooth permission is missing.",
            format!("Allow the \"{capability}\" Bluetooth permission for this app, then try again."),
            false,
            ActionRequired,
        ),
        TintaError::AdapterUnavailable => HumanError::new(
            "This device has no Bluetooth.",
            "Printing needs a Bluetooth adapter. Try another phone or computer.",
            false,
            Permanent,
        ),
        TintaError::AdapterDisabled => HumanError::new(
            "Bluetooth is turned off.",
            "Turn Bluetooth on in your device settings, then try again.",
            false,
            ActionRequired,
        ),
        TintaError::PlatformUnavailable => HumanError::new(
            "This feature isn't available on your device.",
            "Use offline mode to try things out without a printer.",
            false,
            Permanent,
        ),

        // -- Addressing --
        TintaError::InvalidAddress(raw) => HumanError::new(
            "The printer address doesn't look right.",
            format!("A printer address looks like 00:11:62:AA:BB:CC. You entered {raw:?}."),
            false,
            ActionRequired,
        ),
        TintaError::EndpointNotFound(_) => HumanError::new(
            "We couldn't find that printer.",
            "Make sure the printer is switched on and paired with this device, then scan again.",
            false,
            ActionRequired,
        ),
        TintaError::NoPrinterSelected => HumanError::new(
            "No printer selected.",
            "Please choose a printer from the list, then try again.",
            false,
            ActionRequired,
        ),

        // -- Transport --
        TintaError::TransientIo(_) => HumanError::new(
            "The connection to the printer was interrupted.",
            "Move closer to the printer and try again.",
            true,
            Transient,
        ),
        TintaError::Timeout { .. } => HumanError::new(
            "The printer didn't respond in time.",
            "The printer might be off, asleep, or connected to another phone. Check it and try again.",
            true,
            Transient,
        ),
        TintaError::RetriesExhausted { attempts, .. } => HumanError::new(
            "We couldn't reach the printer.",
            format!("We tried {attempts} times. Check the printer is on, has paper, and is in range."),
            true,
            Transient,
        ),
        TintaError::InvalidTransition { .. } | TintaError::WorkerLost => HumanError::new(
            "Printing stopped unexpectedly.",
            "Try again. If this keeps happening, please report it.",
            true,
            Transient,
        ),

        // -- Coordinator --
        TintaError::Busy => HumanError::new(
            "The printer is still busy.",
            "Wait for the current print to finish, then try again.",
            true,
            Transient,
        ),

        // -- Encoding --
        TintaError::EmptyText => HumanError::new(
            "There's nothing to print.",
            "Type some text first.",
            false,
            ActionRequired,
        ),
        TintaError::ImageTooWide { max, .. } => HumanError::new(
            "This image is too wide for the paper.",
            format!("Resize the image to at most {max} pixels wide, or print it with fit-to-width."),
            false,
            Permanent,
        ),
        TintaError::InvalidPixelBuffer(_) | TintaError::Image(_) => HumanError::new(
            "There's a problem with this image.",
            "The image may be damaged or in an unusual format. Try saving it as a PNG or JPEG first.",
            false,
            Permanent,
        ),

        // -- Configuration / persistence --
        TintaError::Config(detail) => HumanError::new(
            "The settings file has a problem.",
            format!("Fix the setting or delete the file to go back to defaults. ({detail})"),
            false,
            ActionRequired,
        ),
        TintaError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError::new(
                "The file couldn't be found.",
                "It may have been moved or deleted. Try choosing the file again.",
                false,
                ActionRequired,
            ),
            std::io::ErrorKind::PermissionDenied => HumanError::new(
                "The app doesn't have permission to use that file.",
                "Check the file permissions, or copy it somewhere else first.",
                false,
                ActionRequired,
            ),
            _ => HumanError::new(
                "There was a problem reading or writing a file.",
                "Try again. If this keeps happening, your storage may be full.",
                true,
                Transient,
            ),
        },
        TintaError::Serialization(_) => HumanError::new(
            "The app had an internal data problem.",
            "Try again. If this keeps happening, please report it.",
            true,
            Transient,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capability;

    #[test]
    fn timeout_is_transient() {
        let err = TintaError::Timeout {
            operation: "open",
            after_ms: 10_000,
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn no_printer_is_action_required() {
        let human = humanize_error(&TintaError::NoPrinterSelected);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn permission_names_the_capability() {
        let human = humanize_error(&TintaError::PermissionDenied(Capability::Scan));
        assert!(human.suggestion.contains("scan"));
        assert!(!human.retriable);
    }

    #[test]
    fn oversized_image_is_permanent() {
        let human = humanize_error(&TintaError::ImageTooWide { width: 600, max: 384 });
        assert_eq!(human.severity, Severity::Permanent);
        assert!(human.suggestion.contains("384"));
    }
}
