//! Emulator Client
//!
//! High-level operations over one emulator session. Every operation is one
//! command followed by one drained response; getters also decode the value
//! into physical units.

use tracing::{debug, info, warn};

use crate::codec::hex_to_integer;
use crate::pid::{MilStatus, Pid};
use crate::protocol::{
    BusProtocol, Command, Connection, ConnectionConfig, ConnectionState, PortProvider,
    PortSelector, ProtocolError, SerialPorts, ACK,
};

/// VINs are padded to this many characters
pub const VIN_LENGTH: usize = 17;

/// Trouble codes stored when the MIL is switched on
pub const MIL_DTC_CODES: &str = "P0302,P0493";

/// Upper-case a VIN and right-pad it with spaces to [`VIN_LENGTH`].
/// Longer input is passed through untruncated.
pub fn format_vin(vin: &str) -> String {
    format!("{:<width$}", vin.to_uppercase(), width = VIN_LENGTH)
}

/// Split a `<pid>=<value>` response and return the trimmed value
pub fn parse_value_response(pid: &str, response: &str) -> Result<String, ProtocolError> {
    let malformed = || ProtocolError::MalformedResponse(response.to_string());

    let Some((prefix, value)) = response.split_once('=') else {
        warn!("ATGET {}: response without '=': {:?}", pid, response);
        return Err(malformed());
    };
    let (prefix, value) = (prefix.trim(), value.trim());

    if prefix.is_empty() || value.is_empty() {
        warn!("ATGET {}: incomplete response: {:?}", pid, response);
        return Err(malformed());
    }
    if !prefix.eq_ignore_ascii_case(pid) {
        debug!("ATGET {}: response labelled {}", pid, prefix);
    }

    Ok(value.to_string())
}

enum Session {
    Disconnected,
    Connected(Connection),
    Closed,
}

/// Client for the emulator's `AT` command protocol
pub struct ProtocolClient<P: PortProvider = SerialPorts> {
    provider: P,
    config: ConnectionConfig,
    session: Session,
}

impl ProtocolClient<SerialPorts> {
    /// Client that talks to real serial ports
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_provider(SerialPorts, config)
    }
}

impl<P: PortProvider> ProtocolClient<P> {
    /// Client that opens ports through `provider`
    pub fn with_provider(provider: P, config: ConnectionConfig) -> Self {
        Self {
            provider,
            config,
            session: Session::Disconnected,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get current session state
    pub fn state(&self) -> ConnectionState {
        match self.session {
            Session::Disconnected => ConnectionState::Disconnected,
            Session::Connected(_) => ConnectionState::Connected,
            Session::Closed => ConnectionState::Closed,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.session, Session::Connected(_))
    }

    /// The live connection, if any
    pub fn connection(&self) -> Option<&Connection> {
        match &self.session {
            Session::Connected(conn) => Some(conn),
            _ => None,
        }
    }

    /// Connect to the port named in the configuration
    pub fn connect_configured(&mut self) -> Result<String, ProtocolError> {
        let selector = self.config.port.clone();
        self.connect(&selector)
    }

    /// Open a session on the selected port and return the port's name.
    ///
    /// Fails with `AlreadyConnected` while a session is live; close it first.
    pub fn connect(&mut self, selector: &PortSelector) -> Result<String, ProtocolError> {
        if self.is_connected() {
            return Err(ProtocolError::AlreadyConnected);
        }

        let ports = self.provider.list_ports()?;
        debug!("Available ports: {:?}", ports);

        let port_name = selector.resolve(&ports).ok_or_else(|| {
            debug!("Could not find port {}", selector);
            ProtocolError::PortNotFound(selector.to_string())
        })?;

        info!("Connecting to {} at {} baud", port_name, self.config.baud_rate);
        let transport = self.provider.open(&port_name, self.config.baud_rate)?;
        self.session = Session::Connected(Connection::new(
            transport,
            port_name.clone(),
            self.config.baud_rate,
            self.config.framing_policy(),
        ));
        info!("Connected to {}", port_name);

        Ok(port_name)
    }

    /// Close the session. Fails with `NotConnected` if there is none.
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        match std::mem::replace(&mut self.session, Session::Closed) {
            Session::Connected(mut conn) => {
                info!("Closing connection to {}", conn.port_name());
                conn.close()
            }
            other => {
                self.session = other;
                Err(ProtocolError::NotConnected)
            }
        }
    }

    /// Run `op` against the live connection. A fatal transport error ends the
    /// session, since nothing on the wire lets us resynchronize.
    fn run<T>(
        &mut self,
        op: impl FnOnce(&mut Connection) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        let result = match &mut self.session {
            Session::Connected(conn) => op(conn),
            _ => return Err(ProtocolError::NotConnected),
        };

        if let Err(e) = &result {
            if e.is_fatal() {
                self.teardown(e);
            }
        }
        result
    }

    fn teardown(&mut self, cause: &ProtocolError) {
        if let Session::Connected(mut conn) = std::mem::replace(&mut self.session, Session::Closed)
        {
            warn!("{} on {}, closing session", cause, conn.port_name());
            if let Err(e) = conn.close() {
                debug!("close after failure: {}", e);
            }
        }
    }

    /// Send a setting command and drain its acknowledgement
    fn apply(&mut self, command: Command) -> Result<(), ProtocolError> {
        let response = self.run(|conn| conn.transact(&command))?;
        if response.trim() != ACK {
            warn!("{}: not acknowledged, got {:?}", command, response);
        }
        Ok(())
    }

    /// Read a PID and convert it to physical units
    fn get_physical(&mut self, pid: Pid) -> Result<u32, ProtocolError> {
        let text = self.get_pid_value(pid.code())?;
        let raw = hex_to_integer(&text)?;
        Ok(pid.to_physical(raw))
    }

    /// Read the raw value text of any PID.
    ///
    /// Drains stale bytes first, so leftovers from an earlier cycle cannot be
    /// mistaken for this response.
    pub fn get_pid_value(&mut self, pid: &str) -> Result<String, ProtocolError> {
        let command = Command::get(pid);
        let response = self.run(|conn| {
            let stale = conn.drain()?;
            if !stale.is_empty() {
                debug!("Discarded stale bytes before {}: {:?}", command, stale);
            }
            conn.transact(&command)
        })?;
        parse_value_response(pid, &response)
    }

    /// Set any PID with the space separated form. Returns whether the device
    /// answered exactly `OK`.
    pub fn set_pid_value(&mut self, pid: &str, value: &str) -> Result<bool, ProtocolError> {
        let command = Command::set_spaced(pid, value);
        let response = self.run(|conn| conn.transact(&command))?;
        Ok(response == ACK)
    }

    pub fn get_engine_rpm(&mut self) -> Result<u32, ProtocolError> {
        self.get_physical(Pid::EngineRpm)
    }

    pub fn set_engine_rpm(&mut self, rpm: u32) -> Result<(), ProtocolError> {
        debug!("[SET] Engine: {} RPM", rpm);
        self.apply(Command::set(Pid::EngineRpm.code(), rpm))
    }

    /// Vehicle speed in km/h
    pub fn get_speed(&mut self) -> Result<u32, ProtocolError> {
        self.get_physical(Pid::VehicleSpeed)
    }

    pub fn set_speed(&mut self, kmh: u32) -> Result<(), ProtocolError> {
        debug!("[SET] Speed: {} km/h", kmh);
        self.apply(Command::set(Pid::VehicleSpeed.code(), kmh))
    }

    /// Battery voltage in whole volts
    pub fn get_battery_voltage(&mut self) -> Result<u32, ProtocolError> {
        self.get_physical(Pid::BatteryVoltage)
    }

    pub fn set_battery_voltage(&mut self, volts: u32) -> Result<(), ProtocolError> {
        debug!("[SET] Battery voltage: {} V", volts);
        self.apply(Command::set(Pid::BatteryVoltage.code(), volts))
    }

    /// Fuel tank level in percent (rounded down)
    pub fn get_fuel_percentage(&mut self) -> Result<u32, ProtocolError> {
        self.get_physical(Pid::FuelTankLevel)
    }

    pub fn set_fuel_percentage(&mut self, percent: u32) -> Result<(), ProtocolError> {
        debug!("[SET] Fuel tank: {} %", percent);
        self.apply(Command::set(Pid::FuelTankLevel.code(), percent))
    }

    /// Engine fuel rate in L/h
    pub fn get_fuel_rate(&mut self) -> Result<u32, ProtocolError> {
        self.get_physical(Pid::EngineFuelRate)
    }

    pub fn set_fuel_rate(&mut self, liters_per_hour: u32) -> Result<(), ProtocolError> {
        debug!("[SET] Engine fuel rate: {} L/h", liters_per_hour);
        self.apply(Command::set(Pid::EngineFuelRate.code(), liters_per_hour))
    }

    pub fn set_engine_started(&mut self, started: bool) -> Result<(), ProtocolError> {
        debug!("[SET] Engine: {}", if started { "ON" } else { "OFF" });
        self.apply(Command::Accessory(started))
    }

    /// Minutes run with the MIL on
    pub fn set_mil_time_traveled(&mut self, minutes: u32) -> Result<(), ProtocolError> {
        debug!("[SET] Time with MIL on: {} min", minutes);
        self.apply(Command::set(Pid::TimeWithMil.code(), minutes))
    }

    /// Kilometres driven with the MIL on
    pub fn set_mil_distance_traveled(&mut self, km: u32) -> Result<(), ProtocolError> {
        debug!("[SET] Distance with MIL on: {} km", km);
        self.apply(Command::set(Pid::DistanceWithMil.code(), km))
    }

    /// Light the MIL by storing [`MIL_DTC_CODES`], or clear all codes
    pub fn set_mil_active(&mut self, active: bool) -> Result<(), ProtocolError> {
        debug!("[SET] MIL: {}", if active { "ON" } else { "OFF" });
        if active {
            self.apply(Command::SetDtc(MIL_DTC_CODES.to_string()))
        } else {
            self.apply(Command::ClearDtc)
        }
    }

    /// Write the monitor status PID directly
    pub fn set_mil_pid(&mut self, status: MilStatus) -> Result<(), ProtocolError> {
        debug!("[SET] MIL status: {:?}", status);
        self.apply(Command::set(Pid::MilStatus.code(), status.to_byte()))
    }

    pub fn clear_dtc(&mut self) -> Result<(), ProtocolError> {
        debug!("[SET] Clear DTC");
        self.apply(Command::ClearDtc)
    }

    /// Store trouble codes. The list is passed through as given,
    /// e.g. `"P0302,P0493"`.
    pub fn set_dtc_codes(&mut self, codes: &str) -> Result<(), ProtocolError> {
        debug!("[SET] DTC: {}", codes);
        self.apply(Command::SetDtc(codes.to_string()))
    }

    pub fn set_vin_reporting_enabled(&mut self, enabled: bool) -> Result<(), ProtocolError> {
        debug!("[SET] VIN reporting: {}", if enabled { "ON" } else { "OFF" });
        self.apply(Command::VinReporting(enabled))
    }

    /// Set the reported VIN (see [`format_vin`])
    pub fn set_vin_reporting_number(&mut self, vin: &str) -> Result<(), ProtocolError> {
        let vin = format_vin(vin);
        debug!("[SET] VIN: {:?}", vin);
        self.apply(Command::SetVin(vin))
    }

    pub fn set_obd_protocol(&mut self, protocol: &BusProtocol) -> Result<(), ProtocolError> {
        debug!("[SET] Bus protocol: {}", protocol);
        self.apply(Command::Bus(protocol.clone()))
    }
}

impl<P: PortProvider> Drop for ProtocolClient<P> {
    fn drop(&mut self) {
        if self.is_connected() {
            let _ = self.close();
        }
    }
}
