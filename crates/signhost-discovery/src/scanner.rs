//! Bounded concurrent TCP scan of local subnets

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use signhost_api::validate_ipv4;
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DiscoveryError;
use crate::interfaces::local_addresses;
use crate::subnet::{self, Subnet};

/// Buffer of the result channel
const RESULT_CHANNEL_CAPACITY: usize = 64;

/// Limits applied to every scan
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Per-address connect timeout
    pub dial_timeout: Duration,
    /// Dials in flight across all subnets
    pub max_concurrency: usize,
    /// Wall-clock budget of one scan
    pub budget: Duration,
    /// Wider subnets are clamped to the local /24
    pub max_subnet_hosts: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_millis(500),
            max_concurrency: 50,
            budget: Duration::from_secs(30),
            max_subnet_hosts: 512,
        }
    }
}

/// An address that accepted a connection on the scanned port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// Discovery scanner
///
/// Each call to [`Scanner::scan`] is an independent, finite scan.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Ranges a scan would cover
    ///
    /// With an override address only its /24 is scanned; otherwise one range
    /// per local interface address, clamped and de-duplicated.
    ///
    /// # Errors
    /// Returns `InvalidOverride` for a malformed override and `Interfaces`
    /// if the local interfaces cannot be listed.
    pub fn subnets(&self, override_address: Option<&str>) -> Result<Vec<Subnet>, DiscoveryError> {
        if let Some(addr) = override_address {
            let anchor = validate_ipv4(addr)?;
            return Ok(vec![Subnet::around(anchor)]);
        }
        let local = local_addresses()?;
        Ok(subnet::normalize(
            local.iter().map(|a| a.subnet()),
            self.config.max_subnet_hosts,
        ))
    }

    /// Start a scan of the local subnets (or the override's /24)
    ///
    /// Returns immediately; live addresses arrive on the receiver as they
    /// answer. The channel closes once every range is done, the budget
    /// elapses, or `cancel` fires.
    ///
    /// # Errors
    /// See [`Scanner::subnets`].
    pub fn scan(
        &self,
        cancel: &CancellationToken,
        port: u16,
        override_address: Option<&str>,
    ) -> Result<mpsc::Receiver<Candidate>, DiscoveryError> {
        let subnets = self.subnets(override_address)?;
        Ok(self.scan_subnets(cancel, port, subnets))
    }

    /// Start a scan of explicit ranges
    pub fn scan_subnets(
        &self,
        cancel: &CancellationToken,
        port: u16,
        subnets: Vec<Subnet>,
    ) -> mpsc::Receiver<Candidate> {
        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let token = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let dial_timeout = self.config.dial_timeout;
        let budget = self.config.budget;

        info!(
            ranges = %subnets.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            port,
            "starting discovery scan"
        );

        tokio::spawn(async move {
            let deadline = token.clone();
            let timer = tokio::spawn(async move {
                tokio::select! {
                    () = sleep(budget) => {
                        debug!("scan budget elapsed");
                        deadline.cancel();
                    }
                    () = deadline.cancelled() => {}
                }
            });

            let mut ranges = JoinSet::new();
            for subnet in subnets {
                ranges.spawn(scan_range(
                    subnet,
                    port,
                    dial_timeout,
                    semaphore.clone(),
                    tx.clone(),
                    token.clone(),
                ));
            }
            drop(tx);

            let mut found = 0;
            while let Some(result) = ranges.join_next().await {
                match result {
                    Ok(n) => found += n,
                    Err(e) => warn!(error = %e, "scan task failed"),
                }
            }
            let timed_out = token.is_cancelled();
            token.cancel();
            let _ = timer.await;
            info!(found, cut_short = timed_out, "discovery scan finished");
        });

        rx
    }
}

/// Dial every candidate of one range; returns how many answered
async fn scan_range(
    subnet: Subnet,
    port: u16,
    dial_timeout: Duration,
    semaphore: Arc<Semaphore>,
    tx: mpsc::Sender<Candidate>,
    cancel: CancellationToken,
) -> usize {
    let mut dials = JoinSet::new();
    let mut found = 0;

    for ip in subnet.candidates() {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let tx = tx.clone();
        let cancel = cancel.clone();
        dials.spawn(async move {
            let _permit = permit;
            let open = tokio::select! {
                biased;
                () = cancel.cancelled() => false,
                result = timeout(dial_timeout, TcpStream::connect(SocketAddrV4::new(ip, port))) => {
                    matches!(result, Ok(Ok(_)))
                }
            };
            if !open {
                return false;
            }
            debug!(host = %ip, port, "peer answered");
            tokio::select! {
                () = cancel.cancelled() => false,
                sent = tx.send(Candidate { ip, port }) => sent.is_ok(),
            }
        });

        while let Some(result) = dials.try_join_next() {
            if matches!(result, Ok(true)) {
                found += 1;
            }
        }
    }

    while let Some(result) = dials.join_next().await {
        if matches!(result, Ok(true)) {
            found += 1;
        }
    }
    debug!(range = %subnet, found, "range done");
    found
}
