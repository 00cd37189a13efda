//! Peripheral Session
//!
//! Owns the connect → communicate → disconnect lifecycle of exactly one
//! UART peripheral. The session never touches a rendering surface; it
//! publishes [`AppEvent`]s that the presentation layer subscribes to.

use crate::domain::error::{SessionError, SetupStep};
use crate::domain::models::{AppEvent, ConnectionState, LedState, MessageSeverity, StatusMessage};
use crate::infrastructure::bluetooth::platform::{
    DeviceFilter, DeviceScanner, GattTransport, LinkId, PeripheralId,
};
use crate::infrastructure::bluetooth::protocol::{self, UartProfile};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Resources that only exist while connected.
struct ActiveLink<T: GattTransport> {
    id: LinkId,
    peripheral: PeripheralId,
    connection: T::Connection,
    write_char: T::Characteristic,
    notify_char: T::Characteristic,
}

pub struct PeripheralSession<S, T>
where
    S: DeviceScanner,
    T: GattTransport<Device = S::Device>,
{
    scanner: S,
    transport: T,
    profile: UartProfile,
    filter: DeviceFilter,
    state: ConnectionState,
    led_state: LedState,
    link: Option<ActiveLink<T>>,
    last_link: LinkId,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl<S, T> PeripheralSession<S, T>
where
    S: DeviceScanner,
    T: GattTransport<Device = S::Device>,
{
    pub fn new(
        scanner: S,
        transport: T,
        profile: UartProfile,
        filter: DeviceFilter,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            scanner,
            transport,
            profile,
            filter,
            state: ConnectionState::Disconnected,
            led_state: LedState::Unknown,
            link: None,
            last_link: 0,
            event_sender,
        }
    }

    #[cfg(test)]
    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(test)]
    pub fn led_state(&self) -> LedState {
        self.led_state
    }

    /// Whether the write and notify channels are held.
    #[cfg(test)]
    pub fn has_channels(&self) -> bool {
        self.link.is_some()
    }

    #[cfg(test)]
    pub fn peripheral_id(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.peripheral.as_str())
    }

    #[cfg(test)]
    pub fn link_id(&self) -> Option<LinkId> {
        self.link.as_ref().map(|l| l.id)
    }

    /// Whether an event tagged `peripheral`/`link` belongs to the live link.
    fn is_active(&self, peripheral: &str, link: LinkId) -> bool {
        self.link
            .as_ref()
            .is_some_and(|l| l.id == link && l.peripheral == peripheral)
    }

    /// Pick a peripheral and bring up the UART link.
    ///
    /// Any failure leaves the session `Disconnected` with nothing retained.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if let Err(e) = self.scanner.is_available().await {
            let err = SessionError::CapabilityUnavailable(format!("{:#}", e));
            error!("{}", err);
            self.send_log(err.to_string(), MessageSeverity::Error);
            return Err(err);
        }

        if self.link.is_some() {
            info!("Closing previous connection before reconnecting");
            self.disconnect().await;
        }

        info!("Requesting UART device");
        self.send_log("Searching for device...", MessageSeverity::Info);
        self.set_state(ConnectionState::Connecting);

        self.last_link += 1;
        let result = self.establish(self.last_link).await;
        match result {
            Ok(link) => {
                info!("Connected to {} (link {})", link.peripheral, link.id);
                self.link = Some(link);
                self.set_state(ConnectionState::Connected);
                self.set_led_state(LedState::Unknown);
                self.send_log("Connected successfully", MessageSeverity::Success);
                Ok(())
            }
            Err(err) => {
                error!("Connection failed: {}", err);
                self.send_log(
                    format!("Connection failed: {}", err),
                    MessageSeverity::Error,
                );
                self.set_state(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    async fn establish(&self, id: LinkId) -> Result<ActiveLink<T>, SessionError> {
        let device = match self.scanner.request_device(&self.filter).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                return Err(SessionError::SelectionCancelled(
                    "no device was chosen".to_string(),
                ))
            }
            Err(e) => return Err(SessionError::transport(SetupStep::Scan, e)),
        };
        info!("Device selected: {} ({})", device.display_name(), device.id);
        self.send_log(
            format!("Device found: {}", device.display_name()),
            MessageSeverity::Info,
        );

        self.send_log("Connecting...", MessageSeverity::Info);
        let connection = self
            .transport
            .connect(&device.handle, id)
            .await
            .map_err(|e| SessionError::transport(SetupStep::Connect, e))?;

        let resolved = self.resolve_channels(&connection).await;
        match resolved {
            Ok((write_char, notify_char)) => Ok(ActiveLink {
                id,
                peripheral: device.id,
                connection,
                write_char,
                notify_char,
            }),
            Err(err) => {
                if let Err(e) = self.transport.disconnect(&connection).await {
                    warn!("Failed to close half-open connection: {:#}", e);
                }
                Err(err)
            }
        }
    }

    async fn resolve_channels(
        &self,
        connection: &T::Connection,
    ) -> Result<(T::Characteristic, T::Characteristic), SessionError> {
        let service = self
            .transport
            .get_service(connection, self.profile.service)
            .await
            .map_err(|e| SessionError::transport(SetupStep::ResolveService, e))?;
        debug!("Resolved service {}", self.profile.service);

        let write_char = self
            .transport
            .get_characteristic(&service, self.profile.write_char)
            .await
            .map_err(|e| SessionError::transport(SetupStep::ResolveWriteCharacteristic, e))?;

        let notify_char = self
            .transport
            .get_characteristic(&service, self.profile.notify_char)
            .await
            .map_err(|e| SessionError::transport(SetupStep::ResolveNotifyCharacteristic, e))?;

        self.transport
            .subscribe(connection, &notify_char)
            .await
            .map_err(|e| SessionError::transport(SetupStep::Subscribe, e))?;
        debug!("Subscribed to {}", self.profile.notify_char);

        Ok((write_char, notify_char))
    }

    /// Close the link if there is one. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            if let Err(e) = self
                .transport
                .unsubscribe(&link.connection, &link.notify_char)
                .await
            {
                debug!("Unsubscribe before disconnect failed: {:#}", e);
            }
            if let Err(e) = self.transport.disconnect(&link.connection).await {
                warn!("Error while disconnecting {}: {:#}", link.peripheral, e);
            }
            info!("Disconnected from {}", link.peripheral);
            self.send_log("Disconnected from device", MessageSeverity::Info);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Send one newline-terminated command. Does not wait for a reply.
    pub async fn send_command(&mut self, command: &str) -> Result<(), SessionError> {
        let Some(link) = self.link.as_ref() else {
            warn!("Command '{}' rejected: not connected", command);
            self.send_log(
                format!("Error: {}", SessionError::NotConnected),
                MessageSeverity::Error,
            );
            return Err(SessionError::NotConnected);
        };

        let frame = protocol::encode_command(command);
        let result = self
            .transport
            .write(&link.connection, &link.write_char, &frame)
            .await;
        match result {
            Ok(()) => {
                debug!("Wrote {} bytes", frame.len());
                info!("Command sent: {}", command);
                let _ = self
                    .event_sender
                    .send(AppEvent::Outbound(command.to_string()));
                Ok(())
            }
            Err(e) => {
                let err = SessionError::WriteFailure(format!("{:#}", e));
                error!("{}", err);
                self.send_log(err.to_string(), MessageSeverity::Error);
                if let Some(link) = self.link.take() {
                    if let Err(e) = self.transport.disconnect(&link.connection).await {
                        debug!("Close after write failure: {:#}", e);
                    }
                }
                self.set_state(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    /// Handle a notification payload from the notify characteristic.
    pub fn on_data_received(&mut self, peripheral: &str, link: LinkId, value: &[u8]) {
        if !self.is_active(peripheral, link) {
            debug!("Dropping notification from inactive link {} of {}", link, peripheral);
            return;
        }

        let Some(inbound) = protocol::decode_inbound(value) else {
            return;
        };

        info!("Device: {}", inbound.text);
        if let Some(led) = inbound.led {
            self.set_led_state(led);
        }
        let _ = self.event_sender.send(AppEvent::Inbound(inbound.text));
    }

    /// Handle a disconnection raised by the platform.
    pub fn on_platform_disconnect(&mut self, peripheral: &str, link: LinkId) {
        if !self.is_active(peripheral, link) {
            debug!("Ignoring disconnect of inactive link {} of {}", link, peripheral);
            return;
        }

        self.link = None;
        warn!("Device {} disconnected", peripheral);
        self.send_log("Device disconnected", MessageSeverity::Warning);
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            let _ = self.event_sender.send(AppEvent::ConnectionState(state));
        }
    }

    fn set_led_state(&mut self, led: LedState) {
        if self.led_state != led {
            self.led_state = led;
            let _ = self.event_sender.send(AppEvent::LedState(led));
        }
    }

    fn send_log(&self, message: impl Into<String>, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::fake::{
        drain, fake_session, set_fail, Fail, FakeScanner, FakeTransport, DEVICE_ID,
    };

    type TestSession = PeripheralSession<FakeScanner, FakeTransport>;

    fn live_link(session: &TestSession) -> LinkId {
        session.link_id().expect("session should be connected")
    }

    fn assert_invariant(session: &TestSession) {
        match session.connection_state() {
            ConnectionState::Connected => assert!(session.has_channels()),
            _ => assert!(!session.has_channels()),
        }
    }

    #[tokio::test]
    async fn test_connect_success() {
        let (mut session, shared, mut rx) = fake_session();
        session.connect().await.unwrap();

        assert_eq!(session.connection_state(), ConnectionState::Connected);
        assert_eq!(session.peripheral_id(), Some(DEVICE_ID));
        assert_invariant(&session);
        assert_eq!(shared.lock().unwrap().subscribed, vec![protocol::UART_NOTIFY_CHAR]);

        let states: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                AppEvent::ConnectionState(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
    }

    #[tokio::test]
    async fn test_capability_unavailable_leaves_state_unchanged() {
        let (mut session, shared, mut rx) = fake_session();
        set_fail(&shared, Some(Fail::Unavailable));

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::CapabilityUnavailable(_)));
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, AppEvent::ConnectionState(_))));
    }

    #[tokio::test]
    async fn test_scan_failure_is_transport_failure() {
        let (mut session, shared, _rx) = fake_session();
        set_fail(&shared, Some(Fail::Scan));

        match session.connect().await {
            Err(SessionError::TransportFailure { step, reason }) => {
                assert_eq!(step, SetupStep::Scan);
                assert_eq!(reason, "adapter refused to start scanning");
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(shared.lock().unwrap().connects.is_empty());
    }

    #[tokio::test]
    async fn test_selection_cancelled() {
        let (mut session, shared, _rx) = fake_session();
        set_fail(&shared, Some(Fail::Select));

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::SelectionCancelled(_)));
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert_invariant(&session);
        assert!(shared.lock().unwrap().connects.is_empty());
    }

    #[tokio::test]
    async fn test_setup_failure_at_each_step_resets() {
        let cases = [
            (Fail::Scan, SetupStep::Scan, false),
            (Fail::Connect, SetupStep::Connect, false),
            (Fail::Service, SetupStep::ResolveService, true),
            (Fail::WriteChar, SetupStep::ResolveWriteCharacteristic, true),
            (Fail::NotifyChar, SetupStep::ResolveNotifyCharacteristic, true),
            (Fail::Subscribe, SetupStep::Subscribe, true),
        ];

        for (fail, expected_step, opened) in cases {
            let (mut session, shared, mut rx) = fake_session();
            set_fail(&shared, Some(fail));

            match session.connect().await {
                Err(SessionError::TransportFailure { step, .. }) => assert_eq!(step, expected_step),
                other => panic!("{:?}: unexpected result {:?}", fail, other),
            }
            assert_eq!(session.connection_state(), ConnectionState::Disconnected);
            assert_invariant(&session);

            // a connection that was opened must be closed again
            let disconnects = shared.lock().unwrap().disconnects.len();
            assert_eq!(disconnects, usize::from(opened), "{:?}", fail);

            let events = drain(&mut rx);
            assert_eq!(
                events.last(),
                Some(&AppEvent::ConnectionState(ConnectionState::Disconnected))
            );
            assert!(events.iter().any(|e| matches!(
                e,
                AppEvent::LogMessage(StatusMessage { severity: MessageSeverity::Error, .. })
            )));
        }
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (mut session, shared, _rx) = fake_session();

        session.disconnect().await;
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);

        session.connect().await.unwrap();
        session.disconnect().await;
        session.disconnect().await;

        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert_invariant(&session);
        assert_eq!(shared.lock().unwrap().disconnects, vec![DEVICE_ID.to_string()]);
    }

    #[tokio::test]
    async fn test_send_when_disconnected_performs_no_write() {
        let (mut session, shared, _rx) = fake_session();
        assert_eq!(session.send_command("ON").await, Err(SessionError::NotConnected));
        assert!(shared.lock().unwrap().writes.is_empty());
    }

    #[tokio::test]
    async fn test_send_appends_newline() {
        let (mut session, shared, mut rx) = fake_session();
        session.connect().await.unwrap();
        drain(&mut rx);

        session.send_command("ON").await.unwrap();
        assert_eq!(shared.lock().unwrap().writes, vec![b"ON\n".to_vec()]);
        assert_eq!(drain(&mut rx), vec![AppEvent::Outbound("ON".to_string())]);
    }

    #[tokio::test]
    async fn test_write_failure_disconnects() {
        let (mut session, shared, _rx) = fake_session();
        session.connect().await.unwrap();
        set_fail(&shared, Some(Fail::Write));

        let err = session.send_command("STATUS").await.unwrap_err();
        assert!(matches!(err, SessionError::WriteFailure(_)));
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert_invariant(&session);
    }

    #[tokio::test]
    async fn test_inbound_classification() {
        let (mut session, _shared, mut rx) = fake_session();
        session.connect().await.unwrap();
        assert_eq!(session.led_state(), LedState::Unknown);
        drain(&mut rx);
        let link = live_link(&session);

        session.on_data_received(DEVICE_ID, link, b"LED ON\n");
        assert_eq!(session.led_state(), LedState::On);

        session.on_data_received(DEVICE_ID, link, b"PONG\n");
        assert_eq!(session.led_state(), LedState::On);

        session.on_data_received(DEVICE_ID, link, b"LED OFF\n");
        assert_eq!(session.led_state(), LedState::Off);

        assert_eq!(
            drain(&mut rx),
            vec![
                AppEvent::LedState(LedState::On),
                AppEvent::Inbound("LED ON".to_string()),
                AppEvent::Inbound("PONG".to_string()),
                AppEvent::LedState(LedState::Off),
                AppEvent::Inbound("LED OFF".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_inbound_is_ignored() {
        let (mut session, _shared, mut rx) = fake_session();
        session.connect().await.unwrap();
        let link = live_link(&session);
        session.on_data_received(DEVICE_ID, link, b"OFF");
        drain(&mut rx);

        session.on_data_received(DEVICE_ID, link, b"");
        session.on_data_received(DEVICE_ID, link, b"  \r\n");

        assert_eq!(session.led_state(), LedState::Off);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_platform_disconnect_clears_channels() {
        let (mut session, shared, mut rx) = fake_session();
        session.connect().await.unwrap();
        drain(&mut rx);

        session.on_platform_disconnect(DEVICE_ID, live_link(&session));

        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert_invariant(&session);
        assert!(shared.lock().unwrap().disconnects.is_empty());
        assert!(drain(&mut rx)
            .contains(&AppEvent::ConnectionState(ConnectionState::Disconnected)));
    }

    #[tokio::test]
    async fn test_stale_events_are_ignored() {
        let (mut session, _shared, mut rx) = fake_session();
        session.on_data_received(DEVICE_ID, 1, b"ON");
        assert_eq!(session.led_state(), LedState::Unknown);
        assert!(drain(&mut rx).is_empty());

        session.connect().await.unwrap();
        let link = live_link(&session);
        session.on_platform_disconnect("11:22:33:44:55:66", link);
        session.on_data_received("11:22:33:44:55:66", link, b"ON");
        assert_eq!(session.connection_state(), ConnectionState::Connected);
        assert_eq!(session.led_state(), LedState::Unknown);
    }

    #[tokio::test]
    async fn test_events_of_previous_link_to_same_device_are_ignored() {
        let (mut session, shared, _rx) = fake_session();
        session.connect().await.unwrap();
        let first = live_link(&session);

        session.connect().await.unwrap();
        let second = live_link(&session);
        assert_ne!(first, second);
        assert_eq!(session.peripheral_id(), Some(DEVICE_ID));

        // raised by the teardown of the first link, delivered late
        session.on_data_received(DEVICE_ID, first, b"ON");
        session.on_platform_disconnect(DEVICE_ID, first);

        assert_eq!(session.connection_state(), ConnectionState::Connected);
        assert_eq!(session.led_state(), LedState::Unknown);
        assert_invariant(&session);

        session.on_platform_disconnect(DEVICE_ID, second);
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert_eq!(shared.lock().unwrap().disconnects, vec![DEVICE_ID.to_string()]);
    }

    #[tokio::test]
    async fn test_reconnect_tears_down_previous_peripheral() {
        let (mut session, shared, _rx) = fake_session();
        session.connect().await.unwrap();
        session.on_data_received(DEVICE_ID, live_link(&session), b"ON");

        shared.lock().unwrap().next_device = "AA:BB:CC:DD:EE:02".to_string();
        session.connect().await.unwrap();

        let rec = shared.lock().unwrap();
        assert_eq!(rec.disconnects, vec![DEVICE_ID.to_string()]);
        assert_eq!(rec.connects.len(), 2);
        drop(rec);
        assert_eq!(session.peripheral_id(), Some("AA:BB:CC:DD:EE:02"));
        assert_eq!(session.led_state(), LedState::Unknown);
    }

    #[tokio::test]
    async fn test_status_scenario() {
        let (mut session, shared, _rx) = fake_session();

        session.connect().await.unwrap();
        session.send_command("STATUS").await.unwrap();
        session.on_data_received(DEVICE_ID, live_link(&session), b"ON");
        assert_eq!(session.led_state(), LedState::On);

        session.disconnect().await;
        assert_eq!(session.send_command("OFF").await, Err(SessionError::NotConnected));
        assert_eq!(shared.lock().unwrap().writes, vec![b"STATUS\n".to_vec()]);
    }
}
