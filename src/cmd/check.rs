//! Configuration and connectivity check.
//!
//! Validates the endpoint settings, looks for each mapped directory under
//! the storage root and probes every mapped dataset.

use std::path::PathBuf;

use console::style;
use serde::Serialize;

use crate::{
   Error, Result,
   config::Config,
   remote::{DifyApi, RemoteClient},
   scan::mapping_dirs,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
   Ok,
   Warn,
   Fail,
}

impl Severity {
   const fn as_str(self) -> &'static str {
      match self {
         Self::Ok => "ok",
         Self::Warn => "warn",
         Self::Fail => "fail",
      }
   }
}

#[derive(Serialize)]
struct Check {
   code:     String,
   severity: String,
   message:  String,
}

#[derive(Serialize)]
struct CheckReport {
   ok:     bool,
   checks: Vec<Check>,
}

impl CheckReport {
   fn push(&mut self, code: &str, severity: Severity, message: impl Into<String>) {
      if severity == Severity::Fail {
         self.ok = false;
      }
      self.checks.push(Check {
         code:     code.to_string(),
         severity: severity.as_str().to_string(),
         message:  message.into(),
      });
   }
}

pub async fn execute(config_path: Option<PathBuf>, json: bool) -> Result<()> {
   let cfg = super::open_config(config_path).snapshot();
   let report = collect(&cfg).await?;

   if json {
      println!("{}", serde_json::to_string_pretty(&report)?);
   } else {
      println!("{}", style("difysync check").bold());
      for check in &report.checks {
         let symbol = match check.severity.as_str() {
            "ok" => style("✓").green(),
            "warn" => style("○").yellow(),
            _ => style("✗").red(),
         };
         println!("{} {} - {}", symbol, check.code, check.message);
      }
      if report.ok {
         println!("\n{}", style("✓ All checks passed.").green().bold());
      } else {
         println!("\n{}", style("✗ Some checks failed.").red().bold());
      }
   }

   if report.ok {
      Ok(())
   } else {
      Err(Error::Reported { message: "check failed".to_string(), exit_code: 1 })
   }
}

async fn collect(cfg: &Config) -> Result<CheckReport> {
   let mut report = CheckReport { ok: true, checks: Vec::new() };

   if cfg.storage_root.is_dir() {
      report.push("storage_root", Severity::Ok, cfg.storage_root.display().to_string());
   } else {
      report.push(
         "storage_root",
         Severity::Fail,
         format!("{} is not a directory", cfg.storage_root.display()),
      );
   }

   if cfg.mappings.is_empty() {
      report.push("mappings", Severity::Warn, "no directory mappings configured");
   } else {
      report.push("mappings", Severity::Ok, format!("{} mapping(s)", cfg.mappings.len()));
   }
   for mapping in &cfg.mappings {
      let dirs = mapping_dirs(&cfg.storage_root, cfg, mapping);
      let code = format!("mapping_dir:{}", mapping.local_path);
      if dirs.is_empty() {
         report.push(&code, Severity::Warn, "no matching directory under the storage root");
      } else {
         report.push(&code, Severity::Ok, format!("{} directory(ies)", dirs.len()));
      }
   }

   let api = DifyApi::new(cfg.request_timeout())?;
   let client = match RemoteClient::new(&api, cfg) {
      Ok(client) => {
         report.push("endpoint", Severity::Ok, client.endpoint().base_url().to_string());
         client
      },
      Err(e) => {
         report.push("endpoint", Severity::Fail, e.to_string());
         return Ok(report);
      },
   };

   for mapping in &cfg.mappings {
      let code = format!("dataset:{}", mapping.dataset_id);
      match client.dataset(&mapping.dataset_id).await {
         Ok(info) => report.push(
            &code,
            Severity::Ok,
            format!("{} ({} documents)", info.name, info.document_count),
         ),
         Err(e) if e.is_not_found() => report.push(&code, Severity::Fail, "dataset not found"),
         Err(e) => report.push(&code, Severity::Fail, e.to_string()),
      }
   }

   Ok(report)
}
