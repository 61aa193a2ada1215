use anyhow::{Result, bail};
use clap::Args;
use oahu_mp4::{
    Stop, StopReason, convert,
    voucher::{KeyMaterial, Voucher},
};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

#[derive(Args, Clone, Debug)]
pub struct KeyArgs {
    /// License voucher (.voucher) holding the content key and IV.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["key", "iv"])]
    voucher: Option<PathBuf>,

    /// Content key as 32 hex digits or base64.
    #[arg(long, value_name = "HEX")]
    key: Option<String>,

    /// Content IV as 32 hex digits or base64.
    #[arg(long, value_name = "HEX", requires = "key")]
    iv: Option<String>,
}

impl KeyArgs {
    pub fn load(&self) -> Result<Option<KeyMaterial>> {
        if let Some(path) = &self.voucher {
            let voucher = Voucher::load(path)?;
            return Ok(Some(convert::key_from_voucher(&voucher)?));
        }

        match &self.key {
            Some(key) => Ok(Some(KeyMaterial::parse(key, self.iv.as_deref())?)),
            None => Ok(None),
        }
    }
}

/// Set by Ctrl-C, checked by the library between frames.
#[derive(Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn install() -> Result<Self> {
        let interrupt = Self::default();
        let flag = interrupt.0.clone();

        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                // Second Ctrl-C, stop waiting for the pipelines to drain.
                std::process::exit(130);
            }
        })?;

        Ok(interrupt)
    }
}

impl Stop for Interrupt {
    fn check(&self) -> Result<(), StopReason> {
        if self.0.load(Ordering::Relaxed) {
            Err(StopReason::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Chapter titles as file names: path separators and reserved characters
/// become `_`, surrounding dots and spaces are dropped.
pub fn file_name(title: &str) -> Result<String> {
    let name = title
        .chars()
        .map(|x| match x {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            x if x.is_control() => '_',
            x => x,
        })
        .collect::<String>();
    let name = name.trim_matches(|x| x == '.' || x == ' ');

    if name.is_empty() {
        bail!("'{}' does not leave a usable file name.", title);
    }
    Ok(name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("Part 1: The Start").unwrap(), "Part 1_ The Start");
        assert_eq!(file_name(" ..hidden. ").unwrap(), "hidden");
        assert!(file_name("...").is_err());
    }

    #[test]
    fn test_interrupt() {
        let interrupt = Interrupt::default();
        assert!(interrupt.check().is_ok());
        interrupt.0.store(true, Ordering::SeqCst);
        assert_eq!(interrupt.check(), Err(StopReason::Cancelled));
    }
}
