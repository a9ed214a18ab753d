//! Operator commands for a running counter.
//!
//! The daemon reads one command per line from stdin:
//!
//! ```text
//! reset                 restart tracing (clear count, new rate window)
//! threshold <value>     set the motion threshold
//! roi <x> <y> <w> <h>   set the ROI (fractions of the frame)
//! status                log FPS, count and controls
//! quit                  stop the counter
//! ```

use anyhow::{anyhow, bail, Result};

use crate::frame::RoiRect;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlCommand {
    Reset,
    Threshold(f32),
    Roi(RoiRect),
    Status,
    Quit,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            bail!("empty command");
        };
        let args: Vec<&str> = parts.collect();
        let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("reset", []) => ControlCommand::Reset,
            ("status", []) => ControlCommand::Status,
            ("quit" | "exit", []) => ControlCommand::Quit,
            ("threshold", [value]) => {
                let value = parse_f32(value)?;
                if value < 0.0 {
                    bail!("threshold must be >= 0");
                }
                ControlCommand::Threshold(value)
            }
            ("roi", [x, y, w, h]) => {
                let roi = RoiRect::new(parse_f32(x)?, parse_f32(y)?, parse_f32(w)?, parse_f32(h)?);
                ControlCommand::Roi(roi)
            }
            (verb, args) => bail!("unknown command '{}' with {} argument(s)", verb, args.len()),
        };
        Ok(command)
    }
}

fn parse_f32(value: &str) -> Result<f32> {
    let parsed: f32 = value
        .parse()
        .map_err(|_| anyhow!("'{}' is not a number", value))?;
    if !parsed.is_finite() {
        bail!("'{}' is not a finite number", value);
    }
    Ok(parsed)
}
