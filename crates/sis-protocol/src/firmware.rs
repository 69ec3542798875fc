//! Firmware banner parsing
//!
//! Switchers answer the firmware query with one of two banner layouts:
//!
//! - `1.23-1.00(1.81LX-DTPCP108 -Fri, 31 Jul 2015)-1.00*(2.03LX-DTPCP108 -Fri, 30 Nov 2018)`
//!   (main, boot version, boot details, app version, app details)
//! - `Ver01*1.23-0005*(XTP CP 4i -Mon, 04 Mar 2019)-A`
//!   (banner version, main, build, details, suffix)
//!
//! Older units reply with just a version number and some trailing text; that
//! is accepted as a loose fallback.

use crate::scan::Cursor;

/// Lines shorter than this are never taken as a loose firmware reply
const LOOSE_MIN_LEN: usize = 6;

/// Identity of the connected device as reported by its firmware banner
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// Composite firmware version string
    pub firmware_version: String,
    /// Model/part identifier, when the banner carries one
    pub model: Option<String>,
}

/// Parse a firmware reply, trying the strict layouts before the loose fallback
pub fn parse_banner(line: &str) -> Option<DeviceInfo> {
    let line = line.trim();
    parse_main_boot_app(line)
        .or_else(|| parse_versioned(line))
        .or_else(|| parse_loose(line))
}

/// `<main>-<boot>(<details>)-<app>*(<details>)`
fn parse_main_boot_app(line: &str) -> Option<DeviceInfo> {
    let mut c = Cursor::new(line);
    let main = c.dotted_version()?;
    if !c.eat("-") {
        return None;
    }
    let boot = c.dotted_version()?;
    let boot_details = parenthesized(&mut c)?;
    if !c.eat("-") {
        return None;
    }
    let app = c.dotted_version()?;
    if !c.eat("*") {
        return None;
    }
    let app_details = parenthesized(&mut c)?;
    if !c.is_empty() {
        return None;
    }

    let model = find_model(boot_details).map(|(_, model)| model.to_string());
    let app_firmware = find_model(app_details)
        .map(|(version, _)| version)
        .unwrap_or(app);

    let mut firmware_version = format!("Main: {main}, Boot: {boot}, App: {app_firmware}");
    if let Some(model) = &model {
        firmware_version.push_str(&format!(" ({model})"));
    }

    Some(DeviceInfo {
        firmware_version,
        model,
    })
}

/// `Ver<NN>*<main>-<build>*(<details>)-<suffix>`
fn parse_versioned(line: &str) -> Option<DeviceInfo> {
    let mut c = Cursor::new(line);
    if !c.eat("Ver") || c.digits().is_empty() || !c.eat("*") {
        return None;
    }
    let main = c.dotted_version()?;
    if !c.eat("-") {
        return None;
    }
    let build = c.take_while(|b| b.is_ascii_alphanumeric() || b == b'.');
    if build.is_empty() || !c.eat("*") {
        return None;
    }
    let details = parenthesized(&mut c)?;
    if !c.eat("-") {
        return None;
    }
    let suffix = c.rest().trim();
    if suffix.is_empty() {
        return None;
    }

    let model = find_model(details)
        .map(|(_, model)| model.to_string())
        .or_else(|| leading_model_name(details));

    let mut firmware_version = format!("Main: {main}, Build: {build}, Rev: {suffix}");
    if let Some(model) = &model {
        firmware_version.push_str(&format!(" ({model})"));
    }

    Some(DeviceInfo {
        firmware_version,
        model,
    })
}

fn parse_loose(line: &str) -> Option<DeviceInfo> {
    if line.len() < LOOSE_MIN_LEN {
        return None;
    }
    Cursor::new(line).dotted_version()?;
    Some(DeviceInfo {
        firmware_version: line.to_string(),
        model: None,
    })
}

/// Consume `(<non-empty, no ')'>)` and return the inside
fn parenthesized<'a>(c: &mut Cursor<'a>) -> Option<&'a str> {
    if !c.eat("(") {
        return None;
    }
    let inner = c.until(b')')?;
    if inner.is_empty() || !c.eat(")") {
        return None;
    }
    Some(inner)
}

/// Find the first `<d.d><UPPER>-<UPPER|DIGIT>` run, returning (version, model)
fn find_model(details: &str) -> Option<(&str, &str)> {
    (0..details.len())
        .filter(|&i| details.is_char_boundary(i))
        .find_map(|i| {
            let mut c = Cursor::new(&details[i..]);
            let version = c.dotted_version()?;
            let start = details.len() - c.rest().len();
            if c.take_while(|b| b.is_ascii_uppercase()).is_empty() || !c.eat("-") {
                return None;
            }
            if c.take_while(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
                .is_empty()
            {
                return None;
            }
            let end = details.len() - c.rest().len();
            Some((version, &details[start..end]))
        })
}

/// Model name written out before the date, as in `XTP CP 4i -Mon, ...`
fn leading_model_name(details: &str) -> Option<String> {
    let name = details.split(" -").next()?.trim();
    (!name.is_empty() && name != details.trim()).then(|| name.to_string())
}
