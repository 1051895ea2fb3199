//! Integration tests for the NASA to MQTT bridge
//!
//! These tests verify end-to-end functionality of the bridge including:
//! - Framing, CRC and resynchronization on a noisy bus
//! - State change detection and publishing
//! - Publish buffering while the broker is away
//! - Polling with bounded retries
//! - Command mapping from MQTT to bus frames
//! - The service loop, its handle and transport reconnection

use bytes::{Bytes, BytesMut};
use nasa2mqtt::codec;
use nasa2mqtt::scheduler::PairState;
use nasa2mqtt::{
    Address, AddressClass, BridgeHandle, Command, ConnectionState, DataType, Decoded, DeviceStateStore, Frame,
    FrameDecoder, MessageNumber, MessageSet, MessageValue, MockTransport, MqttBridge, MqttConfig,
    MqttEvent, Nasa2Mqtt, Nasa2MqttConfig, Nasa2MqttConfigBuilder, PollScheduler, ProtocolError,
    RecordingPublisher, RequestOrigin, TestFixture,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

// ============================================================================
// Helpers
// ============================================================================

fn indoor(address: u8) -> Address {
    Address::new(AddressClass::Indoor, 0x00, address)
}

fn outdoor() -> Address {
    Address::new(AddressClass::Outdoor, 0x00, 0x00)
}

fn mqtt_bridge() -> (MqttBridge, RecordingPublisher, mpsc::Sender<MqttEvent>) {
    let publisher = RecordingPublisher::new();
    let (tx, rx) = mpsc::channel(16);
    let config = MqttConfig {
        host: "broker.local".into(),
        ..MqttConfig::default()
    };
    let bridge = MqttBridge::with_publisher(Box::new(publisher.clone()), rx, &config);
    (bridge, publisher, tx)
}

fn fast_config() -> Nasa2MqttConfig {
    let mut config = Nasa2MqttConfigBuilder::new()
        .poll_interval(Duration::from_secs(60))
        .retries(Duration::from_millis(200), 1)
        .build();
    config.reconnect.initial_delay = Duration::from_millis(10);
    config.reconnect.max_delay = Duration::from_millis(50);
    config
}

/// Rebuild a frame from everything before its CRC, fixing up size and CRC
fn reframe(mut head: Vec<u8>) -> Vec<u8> {
    let size = (head.len() + 3 - 2) as u16;
    head[1..3].copy_from_slice(&size.to_be_bytes());
    let crc = codec::crc16(&head[3..]);
    head.extend_from_slice(&crc.to_be_bytes());
    head.push(codec::END_BYTE);
    head
}

async fn wait_until<F>(handle: &BridgeHandle, mut done: F)
where
    F: FnMut(&nasa2mqtt::BridgeStats) -> bool,
{
    for _ in 0..200 {
        let stats = handle.stats().await.unwrap();
        if done(&stats) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached: {:?}", handle.stats().await.unwrap());
}

// ============================================================================
// Codec
// ============================================================================

#[test]
fn test_frame_round_trip_mixed_kinds() {
    let frame = Frame::new(
        outdoor(),
        Address::new(AddressClass::BroadcastSetLayer, 0x00, 0xFF),
        Command::normal(DataType::Notification, 0x42),
        vec![
            MessageSet::new(MessageNumber(0x4000), 1).unwrap(),
            MessageSet::new(MessageNumber(0x4203), -55).unwrap(),
            MessageSet::new(MessageNumber(0x8413), 123_456).unwrap(),
        ],
    );

    let bytes = frame.encode().unwrap();
    assert_eq!(bytes[0], codec::START_BYTE);
    assert_eq!(bytes[bytes.len() - 1], codec::END_BYTE);
    assert_eq!(
        u16::from_be_bytes([bytes[1], bytes[2]]) as usize,
        bytes.len() - 2
    );

    let decoded = Frame::decode(&bytes).unwrap();
    assert_eq!(decoded, frame);
    assert_eq!(decoded.messages[1].value, MessageValue::Variable(-55));
    assert_eq!(decoded.messages[2].value, MessageValue::LongVariable(123_456));
}

#[test]
fn test_resync_after_corrupted_candidate() {
    // start marker with a plausible size but garbage body and no end marker
    let mut corrupted = vec![0u8; 18];
    corrupted[0] = codec::START_BYTE;
    corrupted[2] = 16;
    let valid = MockTransport::create_notification(indoor(1), &[(0x4203, 22)]);
    assert!(!valid[1..].contains(&codec::START_BYTE));

    let mut buf = BytesMut::new();
    buf.extend_from_slice(&corrupted);
    buf.extend_from_slice(&valid);

    let mut results = Vec::new();
    loop {
        match codec::decode(&mut buf) {
            Decoded::NeedMoreData => break,
            other => results.push(other),
        }
    }

    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], Decoded::Invalid(_)));
    match &results[1] {
        Decoded::Frame(frame) => assert_eq!(frame.source, indoor(1)),
        other => panic!("expected frame, got {:?}", other),
    }
    assert!(buf.is_empty());
}

#[test]
fn test_bit_flip_rejected_by_crc() {
    let mut bytes = MockTransport::create_notification(indoor(0), &[(0x4203, 215)]);
    let value_index = bytes.len() - 4;
    bytes[value_index] ^= 0x01;
    assert!(matches!(
        Frame::decode(&bytes),
        Err(ProtocolError::Checksum { .. })
    ));
}

#[test]
fn test_trailing_bytes_in_valid_frame_rejected() {
    let raw = MockTransport::create_notification(indoor(0), &[(0x4203, 22)]);
    let mut head = raw[..raw.len() - 3].to_vec();
    head.extend_from_slice(&[0xAA, 0xBB]);
    let padded = reframe(head);
    assert_eq!(padded.len(), raw.len() + 2);

    assert_eq!(
        Frame::decode(&padded),
        Err(ProtocolError::TrailingData { count: 1, extra: 2 })
    );

    // the untouched frame still round-trips byte for byte
    let frame = Frame::decode(&raw).unwrap();
    assert_eq!(&frame.encode().unwrap()[..], raw.as_slice());
}

#[test]
fn test_declared_count_must_match_body() {
    let raw = MockTransport::create_notification(indoor(0), &[(0x4203, 22)]);
    let count_at = 12;
    assert_eq!(raw[count_at], 1);

    let mut head = raw[..raw.len() - 3].to_vec();
    head[count_at] = 2;
    assert_eq!(
        Frame::decode(&reframe(head)),
        Err(ProtocolError::Truncated { index: 1 })
    );

    let mut head = raw[..raw.len() - 3].to_vec();
    head[count_at] = 0;
    assert_eq!(
        Frame::decode(&reframe(head)),
        Err(ProtocolError::TrailingData { count: 0, extra: 4 })
    );
}

#[test]
fn test_padded_frame_not_applied() {
    let raw = MockTransport::create_notification(indoor(0), &[(0x4203, 22)]);
    let mut head = raw[..raw.len() - 3].to_vec();
    head.extend_from_slice(&[0xAA, 0xBB]);

    let (mut bridge, _handle) = Nasa2Mqtt::new(MockTransport::new(), fast_config(), None);
    let deltas = bridge.on_data(&reframe(head), Instant::now());
    assert!(deltas.is_empty());
    assert_eq!(bridge.stats().frames_decoded, 0);
    assert!(bridge.stats().frames_invalid >= 1);
    assert!(bridge.store().get(&indoor(0), MessageNumber(0x4203)).is_none());
}

#[test]
fn test_decoder_across_many_small_chunks() {
    let bytes = MockTransport::create_notification(outdoor(), &[(0x8204, 85), (0x8413, 900)]);
    let mut decoder = FrameDecoder::new();
    let now = Instant::now();

    let mut frames = Vec::new();
    for chunk in bytes.chunks(3) {
        decoder.push(chunk, now);
        while let Decoded::Frame(frame) = decoder.next_frame() {
            frames.push(frame);
        }
    }
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].messages.len(), 2);
    assert_eq!(decoder.buffered(), 0);
}

// ============================================================================
// State
// ============================================================================

#[test]
fn test_repeated_frame_is_idempotent() {
    let frame = Frame::decode(&MockTransport::create_notification(
        indoor(0),
        &[(0x4000, 1), (0x4203, 215)],
    ))
    .unwrap();
    let mut store = DeviceStateStore::new();
    let now = Instant::now();

    assert_eq!(store.apply(&frame, now).len(), 2);
    assert!(store.apply(&frame, now).is_empty());
    assert!(store.apply(&frame, now).is_empty());
    assert_eq!(
        store.get(&indoor(0), MessageNumber(0x4203)).map(|o| o.value),
        Some(215)
    );
}

#[test]
fn test_resync_republishes_unchanged_values() {
    let frame = Frame::decode(&MockTransport::create_notification(
        indoor(0),
        &[(0x4203, 215)],
    ))
    .unwrap();
    let mut store = DeviceStateStore::new();
    let now = Instant::now();

    store.apply(&frame, now);
    store.request_full_resync();
    let deltas = store.apply(&frame, now);
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].old, Some(215));
    assert!(store.apply(&frame, now).is_empty());
}

// ============================================================================
// Polling
// ============================================================================

#[test]
fn test_retry_bound_then_stale() {
    let config = Nasa2MqttConfigBuilder::new()
        .poll_interval(Duration::from_secs(30))
        .retries(Duration::from_secs(2), 3)
        .poll_target(indoor(0), MessageNumber(0x4203))
        .build();
    let mut scheduler = PollScheduler::new(&config.poll);
    let start = Instant::now();

    let mut transmissions = scheduler.tick(start).len();
    let mut timeouts = Vec::new();
    for step in 1..=10u64 {
        let (retries, expired) = scheduler.expire(start + Duration::from_secs(2 * step));
        transmissions += retries.len();
        timeouts.extend(expired);
    }

    assert_eq!(transmissions, 4);
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0].attempts, 4);
    assert_eq!(timeouts[0].origin, RequestOrigin::Poll);
    assert!(matches!(
        scheduler.state_of(indoor(0), MessageNumber(0x4203)),
        Some(PairState::Stale { .. })
    ));

    // stale pairs are polled again once a full interval has passed
    let stale_since = start + Duration::from_secs(8);
    assert!(scheduler.tick(stale_since + Duration::from_secs(10)).is_empty());
    assert_eq!(scheduler.tick(stale_since + Duration::from_secs(30)).len(), 1);
}

#[test]
fn test_read_request_frame_shape() {
    let config = Nasa2MqttConfigBuilder::new()
        .poll_target(outdoor(), MessageNumber(0x8204))
        .build();
    let mut scheduler = PollScheduler::new(&config.poll);
    let request = scheduler.tick(Instant::now()).remove(0);

    let bytes = request.frame.encode().unwrap();
    let frame = Frame::decode(&bytes).unwrap();
    assert_eq!(frame.source, Address::bridge());
    assert_eq!(frame.destination, outdoor());
    assert_eq!(frame.command.data_type, DataType::Read);
    assert_eq!(frame.messages[0].number, MessageNumber(0x8204));
}

// ============================================================================
// MQTT
// ============================================================================

#[test]
fn test_end_to_end_delta_published() {
    let (mqtt, publisher, _tx) = mqtt_bridge();
    let (mut bridge, _handle) = Nasa2Mqtt::new(MockTransport::new(), fast_config(), Some(mqtt));
    bridge.on_mqtt_event(MqttEvent::Connected, Instant::now());

    let bytes = MockTransport::create_notification(indoor(1), &[(0x4203, 22)]);
    let deltas = bridge.on_data(&bytes, Instant::now());

    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].address, indoor(1));
    assert_eq!(deltas[0].capability, MessageNumber(0x4203));
    assert_eq!(deltas[0].old, None);
    assert_eq!(deltas[0].new, 22);
    assert_eq!(
        publisher.published(),
        vec![("samsung_ehs/20.00.01/4203/state".to_string(), "22".to_string())]
    );
}

#[test]
fn test_buffered_while_disconnected_then_flushed_in_order() {
    let (mqtt, publisher, _tx) = mqtt_bridge();
    let (mut bridge, _handle) = Nasa2Mqtt::new(MockTransport::new(), fast_config(), Some(mqtt));
    let now = Instant::now();

    for value in [200, 201, 202] {
        let bytes = MockTransport::create_notification(indoor(0), &[(0x4203, value)]);
        bridge.on_data(&bytes, now);
    }
    assert!(publisher.published().is_empty());
    assert_eq!(bridge.stats().mqtt_queued, 3);

    bridge.on_mqtt_event(MqttEvent::Connected, now);
    let payloads: Vec<String> = publisher.published().into_iter().map(|(_, p)| p).collect();
    assert_eq!(payloads, vec!["200", "201", "202"]);
    assert_eq!(publisher.subscriptions(), vec!["samsung_ehs/+/+/set"]);
    assert_eq!(bridge.stats().mqtt_queued, 0);
}

#[test]
fn test_reconnect_republishes_current_values() {
    let (mqtt, publisher, _tx) = mqtt_bridge();
    let (mut bridge, _handle) = Nasa2Mqtt::new(MockTransport::new(), fast_config(), Some(mqtt));
    let now = Instant::now();
    let bytes = MockTransport::create_notification(indoor(0), &[(0x4203, 215)]);

    bridge.on_mqtt_event(MqttEvent::Connected, now);
    bridge.on_data(&bytes, now);
    bridge.on_mqtt_event(MqttEvent::Disconnected("broker restart".into()), now);
    bridge.on_mqtt_event(MqttEvent::Connected, now);
    bridge.on_data(&bytes, now);

    assert_eq!(publisher.published().len(), 2);
}

#[test]
fn test_command_flow() {
    let (mqtt, _publisher, _tx) = mqtt_bridge();
    let (mut bridge, _handle) = Nasa2Mqtt::new(MockTransport::new(), fast_config(), Some(mqtt));
    let now = Instant::now();

    let frame = bridge
        .on_mqtt_event(
            MqttEvent::Command {
                topic: "samsung_ehs/20.00.00/4000/set".into(),
                payload: Bytes::from_static(b"1"),
            },
            now,
        )
        .unwrap();
    assert_eq!(frame.source, Address::bridge());
    assert_eq!(frame.destination, indoor(0));
    assert_eq!(frame.command.data_type, DataType::Request);
    assert_ne!(frame.command.packet_number, 0);
    assert_eq!(bridge.scheduler().pending_count(), 1);

    let response = MockTransport::create_response(indoor(0), frame.command.packet_number, &[(0x4000, 1)]);
    bridge.on_data(&response, now);
    assert_eq!(bridge.scheduler().pending_count(), 0);
}

#[test]
fn test_rejected_command_counted() {
    let (mqtt, _publisher, _tx) = mqtt_bridge();
    let (mut bridge, _handle) = Nasa2Mqtt::new(MockTransport::new(), fast_config(), Some(mqtt));

    let frame = bridge.on_mqtt_event(
        MqttEvent::Command {
            topic: "samsung_ehs/20.00.00/4000/set".into(),
            payload: Bytes::from_static(b"warm"),
        },
        Instant::now(),
    );
    assert!(frame.is_none());
    assert_eq!(bridge.stats().command_errors, 1);
    assert_eq!(bridge.scheduler().pending_count(), 0);
}

// ============================================================================
// Service Loop
// ============================================================================

#[tokio::test]
async fn test_run_decodes_and_discovers() {
    let fixture = TestFixture::heat_pump();
    let (service, handle) = Nasa2Mqtt::new(fixture.transport.clone(), fast_config(), None);
    let task = tokio::spawn(service.run());

    wait_until(&handle, |s| s.frames_decoded == 2).await;
    let discovered = handle.discovered().await.unwrap();
    assert_eq!(discovered.outdoor, vec![outdoor()]);
    assert_eq!(discovered.indoor, vec![indoor(0)]);
    assert_eq!(handle.stats().await.unwrap().deltas, 4);

    handle.shutdown().await.unwrap();
    assert!(task.await.unwrap().is_ok());
    assert!(!nasa2mqtt::SerialTransport::is_connected(&fixture.transport));
}

#[tokio::test]
async fn test_run_polls_and_retries() {
    let transport = MockTransport::new();
    let mut config = fast_config();
    config.poll.targets.push(nasa2mqtt::PollTarget {
        address: indoor(0),
        message: MessageNumber(0x4203),
    });
    let (service, handle) = Nasa2Mqtt::new(transport.clone(), config, None);
    let task = tokio::spawn(service.run());

    // one request plus one retry, then the pair goes stale
    wait_until(&handle, |s| s.request_timeouts == 1).await;
    let sent = transport.sent_frames();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|f| f.command.data_type == DataType::Read));
    assert_eq!(handle.stats().await.unwrap().requests_sent, 2);

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_reconnects_after_read_error() {
    let transport = MockTransport::new();
    transport.error_on_read(Some(1));
    let (service, handle) = Nasa2Mqtt::new(transport.clone(), fast_config(), None);
    let task = tokio::spawn(service.run());

    wait_until(&handle, |s| s.reconnects == 1).await;
    assert_eq!(transport.connect_count(), 2);

    transport.queue_incoming(MockTransport::create_notification(indoor(0), &[(0x4203, 215)]));
    wait_until(&handle, |s| s.frames_decoded == 1).await;

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_gives_up_when_reconnect_exhausted() {
    let transport = MockTransport::new();
    let mut config = fast_config();
    config.reconnect.max_attempts = 2;
    let (service, _handle) = Nasa2Mqtt::new(transport.clone(), config, None);

    let task = tokio::spawn(service.run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    transport.simulate_errors(true);

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_shutdown_while_transport_down() {
    let transport = MockTransport::new();
    let (service, handle) = Nasa2Mqtt::new(transport.clone(), fast_config(), None);
    let task = tokio::spawn(service.run());

    wait_until(&handle, |s| s.transport_state == ConnectionState::Connected).await;
    transport.simulate_errors(true);

    // stats stay answerable while the link is being retried
    wait_until(&handle, |s| s.transport_state == ConnectionState::Reconnecting).await;
    handle.shutdown().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("run should return after shutdown")
        .unwrap();
    assert!(result.is_ok());
    assert!(handle.stats().await.is_err());
}

#[tokio::test]
async fn test_command_held_until_transport_returns() {
    let transport = MockTransport::new();
    let publisher = RecordingPublisher::new();
    let (tx, rx) = mpsc::channel(16);
    let mqtt_config = MqttConfig {
        host: "broker.local".into(),
        ..MqttConfig::default()
    };
    let mqtt = MqttBridge::with_publisher(Box::new(publisher), rx, &mqtt_config);
    let (service, handle) = Nasa2Mqtt::new(transport.clone(), fast_config(), Some(mqtt));
    let task = tokio::spawn(service.run());

    wait_until(&handle, |s| s.transport_state == ConnectionState::Connected).await;
    transport.simulate_errors(true);
    wait_until(&handle, |s| s.transport_state == ConnectionState::Reconnecting).await;

    tx.send(MqttEvent::Connected).await.unwrap();
    tx.send(MqttEvent::Command {
        topic: "samsung_ehs/20.00.00/4000/set".into(),
        payload: Bytes::from_static(b"1"),
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(transport.sent_frames().is_empty());

    transport.simulate_errors(false);
    wait_until(&handle, |s| s.commands_sent == 1).await;
    let sent = transport.sent_frames();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].command.data_type, DataType::Request);
    assert_eq!(sent[0].destination, indoor(0));
    assert_eq!(handle.stats().await.unwrap().reconnects, 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_initial_connect_failure_is_fatal() {
    let transport = MockTransport::new();
    transport.fail_connects(1);
    let (service, _handle) = Nasa2Mqtt::new(transport, fast_config(), None);
    assert!(service.run().await.is_err());
}

#[tokio::test]
async fn test_handle_fails_after_service_stops() {
    let (service, handle) = Nasa2Mqtt::new(MockTransport::new(), fast_config(), None);
    let task = tokio::spawn(service.run());
    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();

    assert!(handle.stats().await.is_err());
}
