use super::*;

fn sample_settings(board_id: Uuid) -> AdvertisementSettings {
    AdvertisementSettings {
        board_id,
        time_between_ads: 30,
        initial_delay_seconds: 2,
        ad_display_duration_override_ms: Some(7_000),
        enable_ai: true,
        person_threshold: 2,
        detection_duration_seconds: 3,
    }
}

fn sample_ad() -> Advertisement {
    Advertisement {
        id: Uuid::new_v4(),
        board_id: Uuid::new_v4(),
        title: "Spring sale".into(),
        media_url: "https://cdn.example/sale.png".into(),
        media_type: MediaType::Image,
        display_duration_ms: Some(5_000),
        is_active: true,
        start_date: Some(1_000),
        end_date: Some(5_000),
        created_at: 0,
        updated_at: 0,
    }
}

// =============================================================================
// WIRE SHAPE
// =============================================================================

#[test]
fn encoded_line_is_flat_object_with_type_board_and_timestamp() {
    let board_id = Uuid::new_v4();
    let line = encode_line(&BroadcastEvent::ping(board_id));
    assert!(line.ends_with('\n'));

    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("valid json");
    assert_eq!(value["type"], "ping");
    assert_eq!(value["boardId"], board_id.to_string());
    assert!(value["timestamp"].as_i64().is_some_and(|ts| ts > 0));
}

#[test]
fn settings_event_uses_camel_case_payload() {
    let board_id = Uuid::new_v4();
    let line = encode_line(&BroadcastEvent::settings_state(sample_settings(board_id)));
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("valid json");

    assert_eq!(value["type"], EVENT_SETTINGS_UPDATED);
    assert_eq!(value["data"]["timeBetweenAds"], 30);
    assert_eq!(value["data"]["initialDelaySeconds"], 2);
    assert_eq!(value["data"]["adDisplayDurationOverride"], 7_000);
    assert_eq!(value["data"]["enableAI"], true);
    assert_eq!(value["data"]["personThreshold"], 2);
    assert_eq!(value["data"]["detectionDurationSeconds"], 3);
}

#[test]
fn advertisements_event_carries_change_metadata() {
    let board_id = Uuid::new_v4();
    let ad_id = Uuid::new_v4();
    let event = BroadcastEvent::advertisements_invalidated(board_id, Some(ad_id), ChangeType::ContentUpdate);
    let value: serde_json::Value = serde_json::from_str(encode_line(&event).trim()).expect("valid json");

    assert_eq!(value["type"], EVENT_ADVERTISEMENTS_UPDATED);
    assert_eq!(value["advertisementId"], ad_id.to_string());
    assert_eq!(value["changeType"], "CONTENT_UPDATE");
    assert_eq!(value["priority"], "NORMAL");
}

#[test]
fn decode_accepts_hand_written_server_line() {
    let board_id = Uuid::new_v4();
    let raw = format!(
        r#"{{"type":"advertisements_updated","boardId":"{board_id}","timestamp":42,"changeType":"ADVERTISEMENT_DELETED","priority":"HIGH"}}"#
    );
    let event = decode_line(&raw).expect("decode");
    assert_eq!(event.board_id, board_id);
    assert_eq!(event.timestamp, 42);
    assert_eq!(
        event.body,
        EventBody::AdvertisementsUpdated {
            advertisement_id: None,
            change_type: ChangeType::AdvertisementDeleted,
            priority: Priority::High,
        }
    );
}

#[test]
fn decode_rejects_unknown_type_and_blank_lines() {
    let board_id = Uuid::new_v4();
    let raw = format!(r#"{{"type":"mystery","boardId":"{board_id}","timestamp":1}}"#);
    assert!(matches!(decode_line(&raw), Err(CodecError::Json(_))));
    assert!(matches!(decode_line("   "), Err(CodecError::Empty)));
    assert!(matches!(decode_line("{not json"), Err(CodecError::Json(_))));
}

// =============================================================================
// DELIVERY CLASSIFICATION
// =============================================================================

#[test]
fn delivery_distinguishes_state_from_invalidate() {
    let board_id = Uuid::new_v4();
    let board = Board { id: board_id, name: "Lobby".into(), configuration: serde_json::json!({}), updated_at: 1 };

    assert_eq!(BroadcastEvent::ping(board_id).delivery(), Delivery::Control);
    assert_eq!(BroadcastEvent::connected(board_id, Uuid::new_v4()).delivery(), Delivery::Control);
    assert_eq!(BroadcastEvent::board_state(board).delivery(), Delivery::State);
    assert_eq!(BroadcastEvent::board_invalidated(board_id).delivery(), Delivery::Invalidate);
    assert_eq!(BroadcastEvent::settings_state(sample_settings(board_id)).delivery(), Delivery::State);
    assert_eq!(
        BroadcastEvent::advertisements_invalidated(board_id, None, ChangeType::AdvertisementCreated).delivery(),
        Delivery::Invalidate
    );
}

#[test]
fn board_state_event_belongs_to_the_board_it_carries() {
    let board = Board { id: Uuid::new_v4(), name: "Atrium".into(), configuration: serde_json::Value::Null, updated_at: 9 };
    let event = BroadcastEvent::board_state(board.clone());
    assert_eq!(event.board_id, board.id);
    assert_eq!(event.kind(), EVENT_BOARD_UPDATED);
}

// =============================================================================
// LINE BUFFER
// =============================================================================

#[test]
fn line_buffer_reassembles_split_chunks() {
    let mut buf = LineBuffer::new();
    assert!(buf.push(b"{\"a\":").is_empty());
    assert_eq!(buf.pending_len(), 5);

    let lines = buf.push(b"1}\n{\"b\":2}\n{\"c\"");
    let lines: Vec<String> = lines.into_iter().map(|l| l.expect("utf8")).collect();
    assert_eq!(lines, vec!["{\"a\":1}".to_owned(), "{\"b\":2}".to_owned()]);
    assert_eq!(buf.pending_len(), 4);
}

#[test]
fn line_buffer_skips_blank_lines_and_strips_carriage_returns() {
    let mut buf = LineBuffer::new();
    let lines: Vec<String> = buf
        .push(b"\n\r\n{\"x\":1}\r\n")
        .into_iter()
        .map(|l| l.expect("utf8"))
        .collect();
    assert_eq!(lines, vec!["{\"x\":1}".to_owned()]);
}

#[test]
fn line_buffer_reports_invalid_utf8_without_losing_later_lines() {
    let mut buf = LineBuffer::new();
    let lines = buf.push(b"\xff\xfe\n{\"ok\":true}\n");
    assert_eq!(lines.len(), 2);
    assert!(matches!(lines[0], Err(CodecError::Utf8)));
    assert_eq!(lines[1].as_deref().expect("second line"), "{\"ok\":true}");
}

// =============================================================================
// MODEL
// =============================================================================

#[test]
fn default_settings_match_documented_values() {
    let board_id = Uuid::new_v4();
    let settings = AdvertisementSettings::defaults_for(board_id);
    assert_eq!(settings.time_between_ads, 60);
    assert_eq!(settings.initial_delay_seconds, 5);
    assert_eq!(settings.ad_display_duration_override_ms, None);
    assert!(!settings.enable_ai);
    assert_eq!(settings.person_threshold, 1);
    assert_eq!(settings.detection_duration_seconds, 0);
    assert!(settings.validate().is_ok());
}

#[test]
fn validate_rejects_out_of_range_fields() {
    let board_id = Uuid::new_v4();

    let mut s = sample_settings(board_id);
    s.time_between_ads = 4;
    assert!(matches!(s.validate(), Err(SettingsError::TimeBetweenAds { .. })));

    let mut s = sample_settings(board_id);
    s.initial_delay_seconds = 61;
    assert!(matches!(s.validate(), Err(SettingsError::InitialDelay { .. })));

    let mut s = sample_settings(board_id);
    s.person_threshold = 0;
    assert_eq!(s.validate(), Err(SettingsError::PersonThreshold));

    let mut s = sample_settings(board_id);
    s.detection_duration_seconds = 61;
    assert!(matches!(s.validate(), Err(SettingsError::DetectionDuration { .. })));
}

#[test]
fn cooldown_is_at_least_two_seconds() {
    let mut s = sample_settings(Uuid::new_v4());
    s.detection_duration_seconds = 0;
    assert_eq!(s.cooldown(), std::time::Duration::from_secs(2));
    s.detection_duration_seconds = 1;
    assert_eq!(s.cooldown(), std::time::Duration::from_secs(2));
    s.detection_duration_seconds = 5;
    assert_eq!(s.cooldown(), std::time::Duration::from_secs(5));
}

#[test]
fn ad_liveness_respects_active_flag_and_schedule() {
    let ad = sample_ad();
    assert!(!ad.is_live_at(999));
    assert!(ad.is_live_at(1_000));
    assert!(ad.is_live_at(5_000));
    assert!(!ad.is_live_at(5_001));

    let mut inactive = sample_ad();
    inactive.is_active = false;
    assert!(!inactive.is_live_at(2_000));

    let mut open_ended = sample_ad();
    open_ended.start_date = None;
    open_ended.end_date = None;
    assert!(open_ended.is_live_at(0));
}

#[test]
fn playlist_item_copies_media_fields() {
    let ad = sample_ad();
    let item = AdvertisementItem::from(&ad);
    assert_eq!(item.id, ad.id);
    assert_eq!(item.media_type, MediaType::Image);
    assert_eq!(item.display_duration_ms, Some(5_000));
    assert_eq!(item.url, ad.media_url);
}
