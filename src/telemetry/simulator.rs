// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Device simulator for demo/testing

use rand::prelude::*;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use super::TelemetryEvent;

/// Publishes random readings for one device, like a field accelerometer
pub struct DeviceSimulator {
    device_type: String,
    device_id: String,
    interval: Duration,
    rng: StdRng,
    min_reading: u32,
    max_reading: u32,
}

impl DeviceSimulator {
    pub fn new(device_type: &str, device_id: &str, interval: Duration) -> Self {
        Self {
            device_type: device_type.to_string(),
            device_id: device_id.to_string(),
            interval,
            rng: StdRng::from_entropy(),
            min_reading: 1,
            max_reading: 4098,
        }
    }

    /// Deterministic readings for tests
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_range(mut self, min_reading: u32, max_reading: u32) -> Self {
        self.min_reading = min_reading.min(max_reading);
        self.max_reading = max_reading.max(min_reading);
        self
    }

    pub fn next_event(&mut self) -> TelemetryEvent {
        let reading = self.rng.gen_range(self.min_reading..=self.max_reading);
        TelemetryEvent::new(&self.device_type, &self.device_id, f64::from(reading))
    }

    /// JSON payload as the device would publish it
    pub fn next_payload(&mut self) -> Vec<u8> {
        let event = self.next_event();
        // Serializing a struct of strings and a finite f64 cannot fail.
        serde_json::to_vec(&event).unwrap_or_default()
    }

    pub async fn run(
        mut self,
        tx: mpsc::Sender<Vec<u8>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            "Simulating device {}:{} every {:?}",
            self.device_type, self.device_id, self.interval
        );
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let payload = self.next_payload();
                    debug!("Simulated payload: {}", String::from_utf8_lossy(&payload));
                    if tx.send(payload).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        debug!("Simulator for {} stopped", self.device_id);
    }
}
