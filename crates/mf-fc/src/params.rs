use anyhow::Result;
use mavlink::common::MavParamType;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::FcError;
use crate::session::Session;

pub const PARAM_ID_LEN: usize = 16;

const PARAM_POLL: Duration = Duration::from_millis(20);

pub fn encode_param_id(name: &str) -> Result<[u8; PARAM_ID_LEN]> {
    anyhow::ensure!(
        !name.is_empty() && name.len() <= PARAM_ID_LEN && name.is_ascii(),
        "invalid parameter name {:?}",
        name
    );
    let mut id = [0u8; PARAM_ID_LEN];
    id[..name.len()].copy_from_slice(name.as_bytes());
    Ok(id)
}

/// Ids that fill all 16 bytes carry no terminator.
pub fn decode_param_id(raw: &[u8; PARAM_ID_LEN]) -> String {
    raw.iter().take_while(|&&c| c != 0).map(|&c| c as char).collect()
}

pub fn servo_function_param(motor: u8) -> String {
    format!("SERVO{}_FUNCTION", motor)
}

pub fn servo_reversed_param(motor: u8) -> String {
    format!("SERVO{}_REVERSED", motor)
}

fn same_value(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

impl Session {
    /// Cached value, or ask the autopilot and wait for its PARAM_VALUE.
    pub async fn get_param(&self, name: &str) -> Result<f32> {
        if let Some(v) = self.shared_state().lock().unwrap().param(name) {
            return Ok(v);
        }
        self.read_param(name).await
    }

    /// Always asks the autopilot, ignoring any cached value.
    pub async fn read_param(&self, name: &str) -> Result<f32> {
        // the PARAM_VALUE reply brings the type back with it
        self.shared_state().lock().unwrap().params.remove(name);

        let cfg = self.config();
        let timeout = Duration::from_millis(cfg.param_timeout_ms);
        let retry = Duration::from_millis(cfg.param_retry_ms.max(1));
        let start = Instant::now();
        while start.elapsed() < timeout {
            self.link().param_request_read(name)?;
            if let Some(v) = self.poll_param(name, retry.min(timeout), |_| true).await {
                return Ok(v);
            }
        }
        Err(FcError::Timeout(timeout, format!("parameter {}", name)).into())
    }

    /// PARAM_SET, resent until the autopilot echoes the new value back.
    pub async fn set_param(&self, name: &str, value: f32) -> Result<()> {
        // Reuse the type the autopilot reported; drop the cache so only a fresh echo confirms.
        let param_type = self.shared_state().lock().unwrap()
            .params
            .remove(name)
            .map(|(_, t)| t)
            .unwrap_or(MavParamType::MAV_PARAM_TYPE_REAL32);

        let cfg = self.config();
        let timeout = Duration::from_millis(cfg.param_timeout_ms);
        let retry = Duration::from_millis(cfg.param_retry_ms.max(1));
        let start = Instant::now();
        while start.elapsed() < timeout {
            self.link().param_set(name, value, param_type)?;
            if self.poll_param(name, retry.min(timeout), |v| same_value(v, value)).await.is_some() {
                return Ok(());
            }
        }

        let seen = self.shared_state().lock().unwrap().param(name);
        Err(FcError::ParamNotConfirmed { name: name.to_string(), wanted: value, seen }.into())
    }

    async fn poll_param<F>(&self, name: &str, window: Duration, accept: F) -> Option<f32>
    where
        F: Fn(f32) -> bool,
    {
        let start = Instant::now();
        loop {
            if let Some(v) = self.shared_state().lock().unwrap().param(name) {
                if accept(v) {
                    return Some(v);
                }
            }
            if start.elapsed() >= window {
                return None;
            }
            tokio::time::sleep(PARAM_POLL).await;
        }
    }

    /// What a servo output does: 33..=38 are Motor1..Motor6, 1 is RC passthrough.
    pub async fn set_motor_function(&self, motor: u8, function: u16) -> Result<()> {
        self.set_param_logged(&servo_function_param(motor), function as f32).await
    }

    pub async fn set_motor_reversed(&self, motor: u8, reversed: bool) -> Result<()> {
        self.set_param_logged(&servo_reversed_param(motor), if reversed { 1.0 } else { 0.0 }).await
    }

    async fn set_param_logged(&self, name: &str, value: f32) -> Result<()> {
        let settle = Duration::from_millis(self.config().param_settle_ms);

        let pre = self.get_param(name).await?;
        debug!("PRE SET PARAM {}: {}", name, pre);
        tokio::time::sleep(settle).await;

        self.set_param(name, value).await?;
        tokio::time::sleep(settle).await;

        let post = self.read_param(name).await?;
        debug!("POST SET PARAM {}: {}", name, post);
        tokio::time::sleep(settle).await;
        Ok(())
    }
}
