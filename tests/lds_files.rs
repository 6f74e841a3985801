use std::collections::BTreeMap;

use emrtd_core::cbeff::{BiometricDataBlock, CbeffInfo, SimpleCbeffInfo, StandardBiometricHeader};
use emrtd_core::iso19794::face::{FaceImage, FaceRecord, IMAGE_DATA_TYPE_JPEG};
use emrtd_core::lds::com::ComFile;
use emrtd_core::lds::dg1::Dg1File;
use emrtd_core::lds::dg2::Dg2File;
use emrtd_core::lds::dg11::Dg11File;
use emrtd_core::lds::mrz::MrzData;
use emrtd_core::lds::LdsFile;
use hex_literal::hex;


const TD3_SAMPLE: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<L898902C36UTO7408122F1204159ZE184226B<<<<<10";


#[test]
fn test_dg1_round_trip() {
    let dg1 = Dg1File::new(MrzData::parse(TD3_SAMPLE).expect("MRZ parsing"));

    let encoded = dg1.to_bytes();
    assert_eq!(&encoded[0..5], &hex!("61 5B 5F 1F 58"));

    let decoded = Dg1File::from_bytes(&encoded).expect("DG1 decoding");
    assert_eq!(decoded.mrz().to_mrz_string(), TD3_SAMPLE);
    assert_eq!(decoded, dg1);
    assert_eq!(decoded.to_bytes(), encoded);
}

#[test]
fn test_dg11_fixture() {
    let simple_dg11 = hex!("
        6B 34 5C 10 5F 0E 5F 10 5F 2B 5F 12 5F 13 5F 14
        5F 15 5F 18 5F 0E 02 3C 3C 5F 10 00 5F 2B 08 31
        39 37 31 31 30 31 39 5F 12 00 5F 13 00 5F 14 00
        5F 15 00 5F 18 00
    ");

    let dg11 = Dg11File::from_bytes(&simple_dg11).expect("DG11 decoding");
    assert_eq!(dg11.name_of_holder(), Some("<<"));
    assert_eq!(dg11.full_date_of_birth(), Some("19711019"));
    assert_eq!(dg11.to_bytes(), &simple_dg11);
}

#[test]
fn test_com_round_trip() {
    let com = ComFile::new("0107", "040000", vec![0x61, 0x75, 0x6B, 0x6E, 0x77]);
    let encoded = com.to_bytes();
    let decoded = ComFile::from_bytes(&encoded).expect("COM decoding");
    assert_eq!(decoded, com);
    assert_eq!(decoded.to_bytes(), encoded);
}

#[test]
fn test_dg2_round_trip_through_sod_style_map() {
    let dg2 = Dg2File::new(vec![CbeffInfo::Simple(SimpleCbeffInfo::new(
        StandardBiometricHeader::default_face(),
        BiometricDataBlock::Face19794(FaceRecord::new(vec![FaceImage {
            gender: 1,
            eye_color: 0,
            hair_color: 0,
            feature_mask: 0,
            expression: 1,
            pose_angle: [0, 0, 0],
            pose_angle_uncertainty: [0, 0, 0],
            feature_points: Vec::new(),
            face_image_type: 1,
            image_data_type: IMAGE_DATA_TYPE_JPEG,
            width: 413,
            height: 531,
            image_color_space: 1,
            source_type: 2,
            device_type: 0,
            quality: 0,
            image_data: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x31, 0x33, 0x33, 0x37],
        }])),
    ))]);

    let encoded = dg2.to_bytes();
    let decoded = Dg2File::from_bytes(&encoded).expect("DG2 decoding");
    assert_eq!(decoded, dg2);
    assert_eq!(decoded.to_bytes(), encoded);

    // files keyed the way the security object consumes them
    let mut data_groups = BTreeMap::new();
    data_groups.insert(2u8, encoded.clone());
    assert_eq!(data_groups.get(&2), Some(&encoded));
}
