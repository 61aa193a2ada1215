use anyhow::Result;
use clap::Args;
use colored::Colorize;
use oahu_mp4::voucher::Voucher;
use std::path::PathBuf;

/// Check the key material and expiry rules of a license voucher.
#[derive(Debug, Clone, Args)]
pub struct VoucherInfo {
    #[arg(required = true)]
    input: PathBuf,
}

impl VoucherInfo {
    pub fn execute(self) -> Result<()> {
        let voucher = Voucher::load(&self.input)?;
        let now = chrono::Utc::now();

        match voucher.key_material() {
            Ok(x) => println!(
                "[{}] key is valid, iv {}",
                "KEY".green(),
                x.iv.map(hex::encode).unwrap_or_else(|| "absent".to_owned())
            ),
            Err(e) => println!("[{}] {}", "KEY".red(), e),
        }

        for rule in &voucher.rules {
            let state = if rule.is_expired(now) {
                "EXPIRED".red()
            } else {
                "ACTIVE".green()
            };
            println!("[{}] {}", state, rule.name);

            for parameter in &rule.parameters {
                println!(
                    "    {} {}",
                    parameter.kind.as_deref().unwrap_or("-").dimmed(),
                    match parameter.expires_at() {
                        Some(x) => x.to_rfc3339(),
                        None => parameter.expire_date.clone().unwrap_or_default(),
                    }
                );
            }
        }

        Ok(())
    }
}
