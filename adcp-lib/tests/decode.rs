mod common;

use adcp::ensemble::bits::{BeamConfig, CoordinateTransform};
use adcp::ensemble::{decode_frames, DataType, Ensemble, Section};
use adcp::framing::{Synchronizer, SyncConfig};
use chrono::NaiveDate;
use common::{ensemble_stream, EnsembleBuilder};

#[test]
fn decode_full_ensemble() {
    let dat = EnsembleBuilder::default().number(42).build();
    let ens = Ensemble::decode(&dat).unwrap();

    assert!(ens.is_valid());
    assert_eq!(ens.header.num_data_types(), 6);
    assert_eq!(
        ens.data_types(),
        vec![
            DataType::FixedLeader,
            DataType::VariableLeader,
            DataType::Velocity,
            DataType::Correlation,
            DataType::EchoIntensity,
            DataType::PercentGood,
        ]
    );

    let fl = &ens.fixed_leader;
    assert_eq!(fl.number_of_beams, 4);
    assert_eq!(fl.number_of_cells, 10);
    assert_eq!(fl.serial_number, 8123);
    assert_eq!(fl.coordinate_transform(), CoordinateTransform::Earth);
    assert_eq!(fl.system_config().frequency_khz, Some(1200));
    assert_eq!(fl.system_config().beam_config, BeamConfig::FourBeamJanus);

    assert_eq!(ens.ensemble_number(), Some(42));
    let expected = NaiveDate::from_ymd_opt(2009, 6, 15)
        .unwrap()
        .and_hms_opt(12, 30, 45)
        .unwrap();
    assert_eq!(ens.instrument_time(), Some(expected));

    let velocity = ens.velocity().unwrap();
    assert_eq!(velocity.values.shape(), &[10, 4]);
    assert_eq!(velocity.values[[0, 0]], -20);
    assert_eq!(velocity.values[[1, 0]], -16, "beams for a cell are adjacent");
    assert_eq!(velocity.values[[9, 3]], 19);

    for profile in [
        ens.correlation().unwrap(),
        ens.echo_intensity().unwrap(),
        ens.percent_good().unwrap(),
    ] {
        assert_eq!(profile.values.shape(), &[10, 4]);
        assert_eq!(profile.values[[2, 1]], 9);
    }
    assert!(ens.status().is_none());
    assert!(ens.bottom_track().is_none());
}

#[test]
fn sections_discovered_in_any_order() {
    let dat = EnsembleBuilder::default()
        .data_types(&[
            DataType::BottomTrack,
            DataType::PercentGood,
            DataType::Velocity,
            DataType::Status,
            DataType::VariableLeader,
        ])
        .build();
    let ens = Ensemble::decode(&dat).unwrap();

    let kinds: Vec<DataType> = ens.sections.iter().map(Section::data_type).collect();
    assert_eq!(
        kinds,
        vec![
            DataType::BottomTrack,
            DataType::PercentGood,
            DataType::Velocity,
            DataType::Status,
            DataType::VariableLeader,
        ]
    );
    assert!(ens.bottom_track().is_some());
    assert_eq!(ens.status().unwrap().values.shape(), &[10, 4]);
    assert_eq!(ens.ensemble_number(), Some(1));
}

#[test]
fn profile_size_follows_fixed_leader() {
    for beams in [1, 3, 4] {
        for cells in [1, 30, 128] {
            let dat = EnsembleBuilder::default()
                .beams(beams)
                .cells(cells)
                .data_types(&[DataType::Velocity, DataType::EchoIntensity])
                .build();
            let ens = Ensemble::decode(&dat).unwrap();

            let (beams, cells) = (usize::from(beams), usize::from(cells));
            let velocity = ens.velocity().unwrap();
            assert_eq!(velocity.number_of_cells(), cells);
            assert_eq!(velocity.number_of_beams(), beams);
            assert_eq!(ens.echo_intensity().unwrap().values.shape(), &[cells, beams]);
        }
    }
}

#[test]
fn profile_larger_than_section_is_an_error() {
    let mut dat = EnsembleBuilder::default()
        .beams(4)
        .data_types(&[DataType::Velocity])
        .build();
    // 2 data types, so the fixed leader starts at 10; number of beams is its 9th byte
    assert_eq!(dat[10 + 8], 4);
    dat[10 + 8] = 5;

    assert!(matches!(
        Ensemble::decode(&dat),
        Err(adcp::Error::TooShort { .. })
    ));
}

#[test]
fn unknown_and_auxiliary_sections() {
    let dat = EnsembleBuilder::default()
        .data_types(&[DataType::AuxiliarySensor])
        .raw_section(vec![0x01, 0x30, 0xaa, 0xbb])
        .build();
    let ens = Ensemble::decode(&dat).unwrap();

    assert_eq!(ens.auxiliary_sensor(), Some(&[1, 2, 3, 4][..]));
    assert_eq!(ens.unknown_ids, vec![0x3001]);
    assert!(ens.is_valid());
}

#[test]
fn synchronize_then_decode_in_parallel() {
    let mut sync = Synchronizer::new(SyncConfig::default());
    let mut frames = sync.push(&ensemble_stream(1000, 40));
    frames.extend(sync.finish());
    assert_eq!(frames.len(), 40);

    let numbers: Vec<u32> = decode_frames(frames.into_iter())
        .unwrap()
        .map(|e| e.unwrap().ensemble_number().unwrap())
        .collect();

    assert_eq!(numbers, (1000..1040).collect::<Vec<u32>>());
}

#[test]
fn serializes_to_json() {
    let dat = EnsembleBuilder::default().build();
    let ens = Ensemble::decode(&dat).unwrap();

    let value = serde_json::to_value(&ens).unwrap();
    assert_eq!(value["fixed_leader"]["number_of_cells"], 10);
    assert_eq!(value["sections"][0]["VariableLeader"]["ensemble_number_lsb"], 1);
    assert!(value.get("data").is_none());
}
