//! vcc-httpd application.
//!
//! This module contains a top-level structure [`App`] that represents the whole
//! vcc-httpd application and a structure [`AppState`] that contains the
//! application state.

use crate::{
    args::Args,
    httpd,
    registers::{MmioWindow, RegisterAccess, SimulatedRegisters},
    uio::Uio,
    vcc::{constants, Vcc},
};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};

/// VCC device used by the application.
///
/// The register backend is selected at run time, depending on whether the
/// hardware is simulated.
pub type Device = Vcc<Box<dyn RegisterAccess + Send>>;

/// vcc-httpd application.
///
/// This struct represents the vcc-httpd application. It owns the HTTP server
/// through which the VCC is controlled.
#[derive(Debug)]
pub struct App {
    httpd: httpd::Server,
}

impl App {
    /// Creates a new application.
    #[tracing::instrument(name = "App::new", level = "debug")]
    pub async fn new(args: &Args) -> Result<App> {
        let registers = open_registers(args).await?;
        let vcc = Vcc::new(args.name.clone(), registers).context("failed to open VCC")?;
        if args.recover {
            vcc.recover().context("failed to recover VCC")?;
        }
        let state = AppState::new(vcc);
        let httpd = httpd::Server::new(&args.listen, state).await?;
        Ok(App { httpd })
    }

    /// Runs the application.
    ///
    /// This only returns if the HTTP server fails.
    #[tracing::instrument(name = "App::run", level = "debug", skip_all)]
    pub async fn run(self) -> Result<()> {
        self.httpd.run().await
    }
}

async fn open_registers(args: &Args) -> Result<Box<dyn RegisterAccess + Send>> {
    if args.simulate {
        tracing::info!(
            "using simulated VCC registers at address {:#08x}",
            args.simulated_base_address
        );
        return Ok(Box::new(SimulatedRegisters::new(
            args.simulated_base_address,
            constants::REGISTER_MAP_SIZE,
        )));
    }
    let uio = Uio::from_name(&args.uio)
        .await
        .with_context(|| format!("failed to open {} UIO", args.uio))?;
    let mapping = uio
        .map_mapping(0)
        .await
        .with_context(|| format!("failed to map {} UIO", args.uio))?;
    let phys_addr = uio.map_addr(0).await?;
    Ok(Box::new(MmioWindow::new(mapping, phys_addr)?))
}

/// Application state.
///
/// This struct contains the application state that needs to be shared between
/// the Axum handlers of the HTTP server. The struct behaves as an `Arc<...>`.
/// It is cheaply clonable and clones represent a reference to a shared object.
#[derive(Debug, Clone)]
pub struct AppState(Arc<State>);

#[derive(Debug)]
struct State {
    vcc: Mutex<Device>,
}

impl AppState {
    /// Creates the application state from a VCC device.
    pub fn new(vcc: Device) -> AppState {
        AppState(Arc::new(State {
            vcc: Mutex::new(vcc),
        }))
    }

    /// Gives access to the [`Vcc`] object of the application.
    ///
    /// The mutex serializes all the register accesses done by the HTTP
    /// handlers.
    pub fn vcc(&self) -> &Mutex<Device> {
        &self.0.vcc
    }
}
