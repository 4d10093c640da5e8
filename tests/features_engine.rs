use civicops::{
    compute_features, run_batch, DerivedFeatureRecord, FeatureEngineConfig, FeatureError,
    RawTicket, RejectReason, ResponseTimeSource, Ticket,
};

const START_TS_MS: i64 = 1_735_689_600_000; // 2025-01-01T00:00:00Z
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

#[test]
fn scenario_three_open_tickets_in_one_category() {
    let tickets = vec![
        Ticket::new("t0", "Noise", START_TS_MS, None),
        Ticket::new("t1", "Noise", START_TS_MS + HOUR_MS, None),
        Ticket::new("t2", "Noise", START_TS_MS + 2 * HOUR_MS, None),
    ];
    let batch = compute_features(&tickets, &FeatureEngineConfig::default()).expect("batch");
    let last = record(&batch.records, "t2");

    assert_eq!(last.rolling_volume(3), Some(3));
    assert_eq!(last.backlog_at_creation, 2);
    assert_eq!(last.backlog_by_type, 2);
    assert_eq!(record(&batch.records, "t0").backlog_at_creation, 0);
}

#[test]
fn scenario_closed_before_next_creation() {
    let tickets = vec![
        Ticket::new("t1", "Potholes", START_TS_MS, Some(START_TS_MS + DAY_MS)),
        Ticket::new("t2", "Potholes", START_TS_MS + 2 * DAY_MS, None),
    ];
    let batch = compute_features(&tickets, &FeatureEngineConfig::default()).expect("batch");
    let second = record(&batch.records, "t2");

    assert_eq!(second.backlog_at_creation, 0);
    assert_eq!(second.backlog_by_type, 0);
    assert_eq!(second.avg_response_time_by_type, 24.0);
    assert_eq!(second.response_time_source, ResponseTimeSource::Category);
    assert_eq!(second.rolling_volume(3), Some(2));
}

#[test]
fn scenario_category_without_closed_history_uses_fallbacks() {
    let tickets = vec![
        Ticket::new("a", "Noise", START_TS_MS, Some(START_TS_MS + 24 * HOUR_MS)),
        Ticket::new("b", "Potholes", START_TS_MS, Some(START_TS_MS + 48 * HOUR_MS)),
        Ticket::new("c", "Graffiti", START_TS_MS, None),
    ];
    let batch = compute_features(&tickets, &FeatureEngineConfig::default()).expect("batch");
    let graffiti = record(&batch.records, "c");
    assert_eq!(graffiti.avg_response_time_by_type, 36.0);
    assert_eq!(graffiti.response_time_source, ResponseTimeSource::BatchMean);

    let open_only = vec![
        Ticket::new("x", "Noise", START_TS_MS, None),
        Ticket::new("y", "Graffiti", START_TS_MS, None),
    ];
    let batch = compute_features(&open_only, &FeatureEngineConfig::default()).expect("batch");
    for record in &batch.records {
        assert_eq!(record.avg_response_time_by_type, 72.0);
        assert_eq!(record.response_time_source, ResponseTimeSource::SlaDefault);
    }
}

#[test]
fn scenario_ratios_are_finite_with_zero_backlog() {
    let tickets: Vec<Ticket> = (0..5)
        .map(|idx| Ticket::new(format!("t{idx}"), "Noise", START_TS_MS, None))
        .collect();
    let batch = compute_features(&tickets, &FeatureEngineConfig::default()).expect("batch");

    for record in &batch.records {
        assert_eq!(record.backlog_at_creation, 0);
        assert_eq!(record.backlog_ratio, 0.0);
        assert!(record.volume_ratio.is_finite());
        assert_eq!(record.volume_ratio, 5.0 / 6.0);
    }
}

#[test]
fn closing_exactly_at_creation_is_not_backlog() {
    let tickets = vec![
        Ticket::new("a", "Noise", START_TS_MS, Some(START_TS_MS + HOUR_MS)),
        Ticket::new("b", "Noise", START_TS_MS + HOUR_MS, None),
    ];
    let batch = compute_features(&tickets, &FeatureEngineConfig::default()).expect("batch");
    assert_eq!(record(&batch.records, "b").backlog_at_creation, 0);
}

#[test]
fn engine_matches_pairwise_oracle_and_invariants() {
    let tickets = synthetic_batch(600);
    let cfg = FeatureEngineConfig::default();
    let batch = compute_features(&tickets, &cfg).expect("batch");

    assert_eq!(batch.records.len(), tickets.len());
    for ticket in &tickets {
        let record = record(&batch.records, &ticket.id);

        let mut previous = 0;
        for window in &cfg.window_days {
            let count = record.rolling_volume(*window).expect("window present");
            assert_eq!(count, naive_rolling(&tickets, ticket, *window), "{}", ticket.id);
            assert!(count >= 1);
            assert!(count >= previous);
            previous = count;
        }

        assert_eq!(
            record.backlog_at_creation,
            naive_backlog(&tickets, ticket, false)
        );
        assert_eq!(record.backlog_by_type, naive_backlog(&tickets, ticket, true));
        assert!(record.backlog_by_type <= record.backlog_at_creation);
        assert!(record.backlog_ratio.is_finite() && record.backlog_ratio >= 0.0);
        assert!(record.volume_ratio.is_finite() && record.volume_ratio >= 0.0);
    }
}

#[test]
fn reruns_and_permutations_produce_identical_records() {
    let tickets = synthetic_batch(300);
    let cfg = FeatureEngineConfig::default();
    let first = compute_features(&tickets, &cfg).expect("first");
    let second = compute_features(&tickets, &cfg).expect("second");
    assert_eq!(first, second);

    let mut shuffled = tickets.clone();
    shuffled.reverse();
    shuffled.rotate_left(17);
    let permuted = compute_features(&shuffled, &cfg).expect("permuted");
    assert_eq!(first.records, permuted.records);
    assert_eq!(first.response_stats, permuted.response_stats);
}

#[test]
fn empty_batch_yields_empty_output() {
    let batch = compute_features(&[], &FeatureEngineConfig::default()).expect("empty batch");
    assert!(batch.records.is_empty());
    assert_eq!(batch.report.output_records, 0);
    assert_eq!(batch.response_stats.fallback_hours, 72.0);
}

#[test]
fn malformed_interval_counts_for_volume_but_not_statistics() {
    let tickets = vec![
        Ticket::new("bad", "Noise", START_TS_MS + 10 * HOUR_MS, Some(START_TS_MS)),
        Ticket::new("ok", "Noise", START_TS_MS + 11 * HOUR_MS, Some(START_TS_MS + 13 * HOUR_MS)),
    ];
    let batch = compute_features(&tickets, &FeatureEngineConfig::default()).expect("batch");

    let ok = record(&batch.records, "ok");
    assert_eq!(ok.rolling_volume(3), Some(2));
    assert_eq!(ok.backlog_at_creation, 0);
    assert_eq!(ok.avg_response_time_by_type, 2.0);
    assert_eq!(batch.report.excluded_from_stats, 1);
}

#[test]
fn run_batch_reports_rejected_rows_and_keeps_the_rest() {
    let raw = vec![
        raw_row("r1", Some("2025-01-01T08:00:00"), None),
        raw_row("r2", None, None),
        raw_row("r3", Some("2025-01-01T09:00:00"), Some("2025-01-01T07:00:00")),
    ];
    let batch = run_batch(raw, &FeatureEngineConfig::default()).expect("batch");

    assert_eq!(batch.report.input_rows, 3);
    assert_eq!(batch.report.output_records, 2);
    assert_eq!(batch.report.rejected_rows.len(), 1);
    assert_eq!(batch.report.rejected_rows[0].reason, RejectReason::MissingCreatedAt);
    assert_eq!(batch.report.warnings.len(), 1);

    let r3 = record(&batch.records, "r3");
    assert_eq!(r3.category, "Street Lights");
    assert_eq!(r3.backlog_at_creation, 1);
    assert_eq!(r3.calendar.hour_of_day, 9);
    assert!(r3.calendar.is_business_hours);
}

#[test]
fn run_batch_rejects_fatal_configuration_before_intake() {
    let cfg = FeatureEngineConfig {
        window_days: vec![7, 14],
        ..FeatureEngineConfig::default()
    };
    let err = run_batch(vec![raw_row("r1", Some("2025-01-01"), None)], &cfg)
        .expect_err("ratio windows are missing");
    assert!(matches!(err, FeatureError::InvalidConfig(_)));
}

#[test]
fn custom_windows_drive_record_layout() {
    let cfg = FeatureEngineConfig {
        window_days: vec![1, 3, 7, 30],
        ..FeatureEngineConfig::default()
    };
    let tickets = vec![
        Ticket::new("a", "Noise", START_TS_MS, None),
        Ticket::new("b", "Noise", START_TS_MS + 20 * DAY_MS, None),
    ];
    let batch = compute_features(&tickets, &cfg).expect("batch");
    let b = record(&batch.records, "b");

    let windows: Vec<u32> = b.rolling_volumes.iter().map(|v| v.window_days).collect();
    assert_eq!(windows, vec![1, 3, 7, 30]);
    assert_eq!(b.rolling_volume(7), Some(1));
    assert_eq!(b.rolling_volume(30), Some(2));
    assert!(batch.schema.column_index("rolling_30d_volume").is_some());
}

fn record<'a>(records: &'a [DerivedFeatureRecord], id: &str) -> &'a DerivedFeatureRecord {
    records
        .iter()
        .find(|record| record.id == id)
        .expect("record must exist")
}

fn raw_row(id: &str, created: Option<&str>, closed: Option<&str>) -> RawTicket {
    RawTicket {
        id: id.to_string(),
        category: Some("street lights".to_string()),
        status: Some("Open".to_string()),
        created_at: created.map(str::to_string),
        closed_at: closed.map(str::to_string),
    }
}

/// Deterministic pseudo-random batch with many ties, open tickets, zero-length
/// and malformed intervals spread over a few categories.
fn synthetic_batch(len: usize) -> Vec<Ticket> {
    let categories = ["Noise", "Potholes", "Graffiti", "Street Lights", "Trash"];
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    (0..len)
        .map(|idx| {
            let created = START_TS_MS + (next() % (30 * 24)) as i64 * HOUR_MS;
            let closed = match next() % 6 {
                0 | 1 => None,
                2 => Some(created),
                3 => Some(created - HOUR_MS),
                _ => Some(created + (next() % (10 * 24)) as i64 * HOUR_MS),
            };
            let category = categories[(next() % categories.len() as u64) as usize];
            Ticket::new(format!("t{idx:04}"), category, created, closed)
        })
        .collect()
}

fn naive_rolling(tickets: &[Ticket], target: &Ticket, window_days: u32) -> u32 {
    let window_start = target.created_ts_ms_utc - i64::from(window_days) * DAY_MS;
    tickets
        .iter()
        .filter(|other| {
            other.category == target.category
                && other.created_ts_ms_utc > window_start
                && other.created_ts_ms_utc <= target.created_ts_ms_utc
        })
        .count() as u32
}

fn naive_backlog(tickets: &[Ticket], target: &Ticket, same_category: bool) -> u32 {
    tickets
        .iter()
        .filter(|other| {
            (!same_category || other.category == target.category)
                && other.created_ts_ms_utc < target.created_ts_ms_utc
                && other
                    .closed_ts_ms_utc
                    .map_or(true, |closed| closed > target.created_ts_ms_utc)
        })
        .count() as u32
}
