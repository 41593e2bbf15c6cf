//! Batch connection workflow.
//!
//! Connects many source devices to one target device, picking ports
//! automatically or walking a sequence of target ports from a given start.

use log::{info, warn};

use super::graph::{TopologyError, TopologyGraph};
use super::types::{DeviceClass, DeviceId, LinkId, PC_PORT};

/// Pick the port to use on a device when none was named.
///
/// Returns the first free port in declaration order, except that a PC
/// prefers its canonical port when it is free.
pub fn auto_port(graph: &TopologyGraph, device: DeviceId) -> Option<String> {
    let device = graph.device(device)?;
    let ports = device.available_ports();
    if device.class() == DeviceClass::Pc {
        if let Some(port) = ports.iter().find(|p| p.as_str() == PC_PORT) {
            return Some(port.clone());
        }
    }
    ports.into_iter().next()
}

/// Increment the last run of digits in a port name (`Fa0/1` -> `Fa0/2`).
/// Names without digits are returned unchanged.
pub fn increment_port(name: &str) -> String {
    let Some(end) = name.rfind(|c: char| c.is_ascii_digit()) else {
        return name.to_string();
    };
    let start = name[..end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);

    let digits = &name[start..=end];
    let Some(next) = digits.parse::<u64>().ok().and_then(|n| n.checked_add(1)) else {
        return name.to_string();
    };
    format!("{}{}{}", &name[..start], next, &name[end + 1..])
}

/// Parameters of one batch connection run
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub sources: Vec<DeviceId>,
    pub target: DeviceId,
    /// First port to use on the target; incremented after every success.
    /// `None` auto-assigns target ports.
    pub start_target_port: Option<String>,
    /// Port every source should use. `None` auto-assigns.
    pub source_port: Option<String>,
}

/// What a batch run did
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub connected: Vec<LinkId>,
    /// Sources that were passed over, with the reason
    pub skipped: Vec<(DeviceId, TopologyError)>,
    /// Set when the run ended before every source was handled
    pub stopped: Option<TopologyError>,
}

/// Connect every source in `request` to its target.
///
/// A source is skipped when it is the target itself, when its named port is
/// missing or busy, or when it has no free port. The run stops when a named
/// target port is missing or busy, or when the target is full.
pub fn connect_batch(
    graph: &mut TopologyGraph,
    request: &BatchRequest,
) -> Result<BatchOutcome, TopologyError> {
    let target = request.target;
    let target_name = graph.require(target)?.hostname.clone();

    let mut outcome = BatchOutcome::default();
    let mut next_target_port = request.start_target_port.clone();

    for &source in &request.sources {
        if source == target {
            warn!("Skipping {}: cannot connect a device to itself", target_name);
            outcome.skipped.push((
                source,
                TopologyError::SelfLink {
                    device: target_name.clone(),
                },
            ));
            continue;
        }

        let source_port = match pick_source_port(graph, source, request.source_port.as_deref()) {
            Ok(port) => port,
            Err(e) => {
                warn!("Skipping source: {}", e);
                outcome.skipped.push((source, e));
                continue;
            }
        };

        let target_port = match pick_target_port(graph, target, next_target_port.as_deref()) {
            Ok(port) => port,
            Err(e) => {
                warn!("Stopping batch: {}", e);
                outcome.stopped = Some(e);
                break;
            }
        };

        match graph.connect(source, &source_port, target, &target_port) {
            Ok(link) => outcome.connected.push(link),
            Err(e) => {
                warn!("Skipping source: {}", e);
                outcome.skipped.push((source, e));
                continue;
            }
        }

        if let Some(port) = next_target_port.as_mut() {
            *port = increment_port(port);
        }
    }

    info!(
        "Batch connected {} device(s) to {}",
        outcome.connected.len(),
        target_name
    );
    Ok(outcome)
}

fn pick_source_port(
    graph: &TopologyGraph,
    source: DeviceId,
    preferred: Option<&str>,
) -> Result<String, TopologyError> {
    let device = graph.require(source)?;
    match preferred {
        Some(name) => match device.interface(name) {
            None => Err(TopologyError::PortNotFound {
                device: device.hostname.clone(),
                port: name.to_string(),
            }),
            Some(port) if port.is_connected() => Err(TopologyError::PortBusy {
                device: device.hostname.clone(),
                port: name.to_string(),
            }),
            Some(port) => Ok(port.name.clone()),
        },
        None => auto_port(graph, source).ok_or_else(|| TopologyError::NoFreePort {
            device: device.hostname.clone(),
        }),
    }
}

fn pick_target_port(
    graph: &TopologyGraph,
    target: DeviceId,
    manual: Option<&str>,
) -> Result<String, TopologyError> {
    let device = graph.require(target)?;
    match manual {
        Some(name) => match device.interface(name) {
            None => Err(TopologyError::PortNotFound {
                device: device.hostname.clone(),
                port: name.to_string(),
            }),
            Some(port) if port.is_connected() => Err(TopologyError::PortBusy {
                device: device.hostname.clone(),
                port: name.to_string(),
            }),
            Some(port) => Ok(port.name.clone()),
        },
        None => device
            .available_ports()
            .into_iter()
            .next()
            .ok_or_else(|| TopologyError::NoFreePort {
                device: device.hostname.clone(),
            }),
    }
}
