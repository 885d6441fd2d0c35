//! End-to-end orchestration against scripted instruments: one record per
//! test set, skip-on-unchanged bookkeeping, and error degradation.

use rf_bench::instrument::mock::MockLink;
use rf_bench::instrument::registry::{SessionRegistry, SharedSession};
use rf_bench::instrument::session::InstrumentSession;
use rf_bench::matrix::TestMatrix;
use rf_bench::measurement::result::MeasurementResult;
use rf_bench::runner::Runner;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn shared(link: &MockLink) -> SharedSession {
    Arc::new(Mutex::new(
        InstrumentSession::over_link(Box::new(link.clone())).unwrap(),
    ))
}

fn scripted_bench() -> (MockLink, MockLink, SessionRegistry) {
    let vsa = MockLink::new("MOCK,VSA,0,1.0");
    let vsg = MockLink::new("MOCK,VSG,0,1.0");
    vsg.on(":SOUR1:POW:PEP?", "-8.0");
    vsa.on(":FETC:CC1:SUMM:EVM:ALL:AVER?", "-46.5");
    vsa.on(
        ":CALC:MARK:FUNC:POW:RES? ACP",
        "-10.21,-45.30,-45.91,-60.02,-60.77",
    );
    vsa.on(":CALC:MARK:FUNC:NOIS:RES?", "-95.2");
    let registry = SessionRegistry::with_sessions(shared(&vsa), shared(&vsg));
    (vsa, vsg, registry)
}

#[test]
fn unchanged_test_set_skips_setup_but_still_measures() {
    let (vsa, _vsg, registry) = scripted_bench();
    let matrix: TestMatrix = serde_json::from_value(json!({
        "nr5g": [{
            "run": true,
            "center_frequency_ghz": [6.0, 6.0],
            "power_dbm": [-10.0],
            "measure_aclr": true,
            "waveform_file": "5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.wv",
            "setup_file": "5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.dfl"
        }]
    }))
    .unwrap();
    let results = Runner::new(registry).run(&matrix);
    assert_eq!(results.len(), 2);

    let MeasurementResult::Nr5g(first) = &results[0] else {
        panic!("expected an NR5G record");
    };
    assert_eq!(first.test_set, 1);
    assert_eq!(first.evm, -46.5);
    assert_eq!(first.ch_pwr, Some(-10.21));
    assert!(first.error.is_none());
    assert!(first.timings.get("configure_generator").is_some());

    // Second set: same waveform/setup, same frequency — setup and retune
    // are skipped with explicit zero timings, the capture still runs.
    let MeasurementResult::Nr5g(second) = &results[1] else {
        panic!("expected an NR5G record");
    };
    assert_eq!(second.test_set, 2);
    assert_eq!(second.timings.get("configure_generator"), Some(0.0));
    assert_eq!(second.timings.get("configure_analyzer"), Some(0.0));
    assert_eq!(second.timings.get("retune"), Some(0.0));
    assert!(second.timings.get("measure_evm").is_some());
    assert_eq!(second.evm, -46.5);

    // The setup recall went to the analyzer exactly once.
    let recalls = vsa
        .sent()
        .iter()
        .filter(|cmd| cmd.contains(":MMEM:LOAD:STAT"))
        .count();
    assert_eq!(recalls, 1);
}

#[test]
fn malformed_evm_readback_still_yields_a_record() {
    let (vsa, _vsg, registry) = scripted_bench();
    vsa.on(":FETC:CC1:SUMM:EVM:ALL:AVER?", "N/A");
    let matrix: TestMatrix = serde_json::from_value(json!({
        "nr5g": [{
            "run": true,
            "center_frequency_ghz": 6.0,
            "power_dbm": -10.0,
            "measure_aclr": false,
            "waveform_file": "5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.wv",
            "setup_file": "5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.dfl"
        }]
    }))
    .unwrap();
    let results = Runner::new(registry).run(&matrix);
    assert_eq!(results.len(), 1);
    let MeasurementResult::Nr5g(record) = &results[0] else {
        panic!("expected an NR5G record");
    };
    assert!(record.evm.is_nan());
    assert!(record.error.is_none());
    // ACLR disabled: key recorded as an explicit skip.
    assert_eq!(record.timings.get("measure_aclr"), Some(0.0));
}

#[test]
fn invalid_waveform_name_aborts_the_family_without_records() {
    let (_vsa, _vsg, registry) = scripted_bench();
    let matrix: TestMatrix = serde_json::from_value(json!({
        "lte": [{
            "run": true,
            "center_frequency_ghz": 6.0,
            "power_dbm": -10.0,
            "waveform_file": "LTE_bad_name.wv"
        }],
        "STN": [{
            "run": true,
            "center_frequency_ghz": 2.44,
            "iterations": 2
        }]
    }))
    .unwrap();
    let results = Runner::new(registry).run(&matrix);
    // The LTE entry produced nothing; later families still ran, and the
    // global set numbering moved on past the aborted family.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].type_label(), "STN");
    assert_eq!(results[0].test_set(), 1);
}

#[test]
fn disabled_entries_produce_no_records() {
    let (_vsa, _vsg, registry) = scripted_bench();
    let matrix: TestMatrix = serde_json::from_value(json!({
        "nr5g": [{
            "run": false,
            "center_frequency_ghz": 6.0,
            "power_dbm": -10.0
        }]
    }))
    .unwrap();
    let results = Runner::new(registry).run(&matrix);
    assert!(results.is_empty());
}

#[test]
fn spur_sets_filter_the_fundamental_and_flag_empty_results() {
    let (vsa, _vsg, registry) = scripted_bench();
    vsa.on(":CALC:MARK:FUNC:FPE:COUN?", "2");
    vsa.on(":CALC:MARK:FUNC:FPE:X?", "2441000000,2460000000");
    vsa.on(":CALC:MARK:FUNC:FPE:Y?", "-100.1,-105.5");
    let matrix: TestMatrix = serde_json::from_value(json!({
        "spur_search": [{
            "run": true,
            "fundamental_frequency_ghz": [2.44, 2.43],
            "rbw_mhz": 0.02,
            "spur_limit_dbm": -122,
            "power_dbm": -70
        }]
    }))
    .unwrap();
    let results = Runner::new(registry).run(&matrix);
    assert_eq!(results.len(), 2);
    let MeasurementResult::SpurSearch(first) = &results[0] else {
        panic!("expected a SpurSearch record");
    };
    // At 2.44 GHz the 2.441 GHz peak is the carrier; one spur survives.
    assert_eq!(first.spurs.len(), 1);
    assert_eq!(first.spurs[0].frequency_hz, 2.46e9);
    assert!(first.error.is_none());
    let MeasurementResult::SpurSearch(second) = &results[1] else {
        panic!("expected a SpurSearch record");
    };
    // At 2.43 GHz both peaks clear the guard band.
    assert_eq!(second.spurs.len(), 2);
}

#[test]
fn spur_count_mismatch_yields_an_empty_flagged_record() {
    let (vsa, _vsg, registry) = scripted_bench();
    vsa.on(":CALC:MARK:FUNC:FPE:COUN?", "3");
    vsa.on(":CALC:MARK:FUNC:FPE:X?", "2460000000");
    vsa.on(":CALC:MARK:FUNC:FPE:Y?", "-105.5");
    let matrix: TestMatrix = serde_json::from_value(json!({
        "spur_search": [{
            "run": true,
            "fundamental_frequency_ghz": 2.44
        }]
    }))
    .unwrap();
    let results = Runner::new(registry).run(&matrix);
    assert_eq!(results.len(), 1);
    let MeasurementResult::SpurSearch(record) = &results[0] else {
        panic!("expected a SpurSearch record");
    };
    assert!(record.spurs.is_empty());
    assert_eq!(record.error.as_deref(), Some("No spurs detected"));
}

#[test]
fn stn_sets_reuse_one_driver_and_compute_stats() {
    let (vsa, vsg, registry) = scripted_bench();
    let matrix: TestMatrix = serde_json::from_value(json!({
        "STN": [{
            "run": true,
            "center_frequency_ghz": [2.4, 2.405],
            "iterations": 3
        }]
    }))
    .unwrap();
    let results = Runner::new(registry).run(&matrix);
    assert_eq!(results.len(), 2);
    for result in &results {
        let MeasurementResult::Stn(record) = result else {
            panic!("expected an STN record");
        };
        assert_eq!(record.markers.len(), 3);
        assert!(record.markers.iter().all(|m| m.marker == Some(-95.2)));
        let stats = record.stats.as_ref().unwrap();
        assert_eq!(stats.avg, -95.2);
        assert_eq!(stats.delta, 0.0);
        assert!(record.error.is_none());
    }
    // The generator was muted once, at driver construction.
    let mutes = vsg
        .sent()
        .iter()
        .filter(|cmd| cmd.as_str() == "OUTP:STAT OFF")
        .count();
    assert_eq!(mutes, 1);
    // The second set moved the capture frequency instead of reconfiguring
    // from scratch.
    assert!(vsa.sent_contains(":SENS:FREQ:CENT 2405000000"));
}

#[test]
fn failed_stn_iterations_keep_the_set_alive() {
    let (vsa, _vsg, registry) = scripted_bench();
    vsa.on(":CALC:MARK:FUNC:NOIS:RES?", "****");
    let matrix: TestMatrix = serde_json::from_value(json!({
        "STN": [{
            "run": true,
            "center_frequency_ghz": 2.44,
            "iterations": 2
        }]
    }))
    .unwrap();
    let results = Runner::new(registry).run(&matrix);
    assert_eq!(results.len(), 1);
    let MeasurementResult::Stn(record) = &results[0] else {
        panic!("expected an STN record");
    };
    assert_eq!(record.markers.len(), 2);
    assert!(record.markers.iter().all(|m| m.marker.is_none()));
    assert!(record.stats.is_none());
    assert_eq!(record.error.as_deref(), Some("No successful measurements"));
}

#[test]
fn every_family_in_one_run_gets_sequential_set_numbers() {
    let (vsa, _vsg, registry) = scripted_bench();
    vsa.on(":CALC:MARK:FUNC:FPE:COUN?", "0");
    let matrix: TestMatrix = serde_json::from_value(json!({
        "nr5g": [{
            "run": true,
            "center_frequency_ghz": 6.0,
            "power_dbm": [-10.0, -9.0],
            "waveform_file": "5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.wv",
            "setup_file": "5GNR_UL_10MHz_256QAM_30kHz_24RB_0RBO.dfl"
        }],
        "spur_search": [{
            "run": true,
            "fundamental_frequency_ghz": 2.44
        }],
        "STN": [{
            "run": true,
            "center_frequency_ghz": 2.44,
            "iterations": 1
        }]
    }))
    .unwrap();
    let results = Runner::new(registry).run(&matrix);
    let numbers: Vec<u32> = results.iter().map(|r| r.test_set()).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    let labels: Vec<&str> = results.iter().map(|r| r.type_label()).collect();
    assert_eq!(labels, vec!["NR5G", "NR5G", "SpurSearch", "STN"]);
}
