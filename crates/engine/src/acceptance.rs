// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Acceptance gate for `done` replies.
//!
//! A worker's `done` is only believed when the reply carries no failure
//! signal, carries hard evidence (when required), and every configured
//! verify command exits as expected. Anything else demotes the reply to
//! `blocked` with `incomplete_output`.

use crate::evidence::{has_failure_signal, normalize_evidence, EvidenceBundle};
use orc_adapters::run_with_timeout;
use orc_core::WorkerReply;
use orc_policy::{AcceptancePolicy, VerifyCommand};
use orc_storage::StateDir;
use serde::Serialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Why a `done` reply was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceReason {
    DoneWithEvidence,
    FailureSignalDetected,
    MissingHardEvidence,
    VerifyCommandFailed,
}

impl AcceptanceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptanceReason::DoneWithEvidence => "done_with_evidence",
            AcceptanceReason::FailureSignalDetected => "failure_signal_detected",
            AcceptanceReason::MissingHardEvidence => "missing_hard_evidence",
            AcceptanceReason::VerifyCommandFailed => "verify_command_failed",
        }
    }
}

/// Gate verdict.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceVerdict {
    pub accepted: bool,
    pub reason: AcceptanceReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub evidence: EvidenceBundle,
}

/// The acceptance gate bound to one run root.
#[derive(Clone)]
pub struct AcceptanceGate {
    dirs: StateDir,
}

impl AcceptanceGate {
    pub fn new(dirs: StateDir) -> Self {
        Self { dirs }
    }

    /// Grade a `done` reply for the given role.
    pub async fn grade(&self, role: &str, reply: &WorkerReply, raw_text: &str) -> AcceptanceVerdict {
        let evidence = normalize_evidence(&reply.raw, raw_text);

        if has_failure_signal(&evidence.normalized_text) {
            return AcceptanceVerdict {
                accepted: false,
                reason: AcceptanceReason::FailureSignalDetected,
                detail: Some("reply contains an explicit failure signal".to_string()),
                evidence,
            };
        }

        let policy = AcceptancePolicy::load(&self.dirs);
        if policy.require_evidence(role) && !evidence.has_hard_evidence() {
            return AcceptanceVerdict {
                accepted: false,
                reason: AcceptanceReason::MissingHardEvidence,
                detail: Some("no hard evidence (url, file path, or test-pass line)".to_string()),
                evidence,
            };
        }

        for verify in policy.verify_commands(role) {
            if let Some(detail) = self.run_verify(&verify).await {
                return AcceptanceVerdict {
                    accepted: false,
                    reason: AcceptanceReason::VerifyCommandFailed,
                    detail: Some(detail),
                    evidence,
                };
            }
        }

        AcceptanceVerdict {
            accepted: true,
            reason: AcceptanceReason::DoneWithEvidence,
            detail: None,
            evidence,
        }
    }

    /// Run one verify command. Returns a failure detail, or `None` on the
    /// expected exit code.
    async fn run_verify(&self, verify: &VerifyCommand) -> Option<String> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&verify.cmd);
        cmd.current_dir(self.dirs.root());

        debug!(cmd = %verify.cmd, "running verify command");
        match run_with_timeout(
            cmd,
            Duration::from_secs(verify.timeout_sec),
            "verify command",
        )
        .await
        {
            Ok(output) => {
                let exit = output.status.code().unwrap_or(-1);
                if exit == verify.expect_exit_code {
                    None
                } else {
                    Some(format!("cmd={} exit={exit}", verify.cmd))
                }
            }
            Err(failure) if failure.is_timeout() => {
                Some(format!("cmd={} exit=timeout", verify.cmd))
            }
            Err(failure) => Some(format!("cmd={} exit=spawn_error ({failure})", verify.cmd)),
        }
    }
}

#[cfg(test)]
#[path = "acceptance_tests.rs"]
mod tests;
