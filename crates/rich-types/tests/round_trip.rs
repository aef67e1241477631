use rich_types::*;
use serde_json::json;

fn samples() -> Vec<Variant> {
    vec![
        Variant::Vector3(Vector3::ZERO),
        Variant::Vector3(Vector3::new(-12.5, 0.0, 1e6)),
        Variant::Vector2(Vector2::new(0.25, -3.0)),
        Variant::Color3(Color3::from_rgb(0, 0, 0)),
        Variant::Color3(Color3::from_rgb(255, 128, 7)),
        Variant::CFrame(CFrame {
            components: [
                1.0, -2.5, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
            ],
        }),
        Variant::UDim(UDim {
            scale: -0.5,
            offset: 0,
        }),
        Variant::UDim2(UDim2 {
            x: UDim {
                scale: 0.0,
                offset: -40,
            },
            y: UDim {
                scale: 1.75,
                offset: 12,
            },
        }),
        Variant::EnumItem(EnumItem {
            enum_type: "Material".into(),
            name: "Plastic".into(),
            value: Some(256),
        }),
        Variant::EnumItem(EnumItem {
            enum_type: "KeyCode".into(),
            name: "E".into(),
            value: None,
        }),
        Variant::BrickColor(BrickColor {
            name: "Bright red".into(),
            number: Some(21),
        }),
        Variant::NumberSequence(NumberSequence {
            keypoints: vec![
                NumberSequenceKeypoint {
                    time: 0.0,
                    value: -1.0,
                    envelope: 0.0,
                },
                NumberSequenceKeypoint {
                    time: 1.0,
                    value: 0.125,
                    envelope: 0.5,
                },
            ],
        }),
        Variant::ColorSequence(ColorSequence {
            keypoints: vec![
                ColorSequenceKeypoint {
                    time: 0.0,
                    color: Color3::from_rgb(255, 255, 255),
                },
                ColorSequenceKeypoint {
                    time: 1.0,
                    color: Color3::from_rgb(0, 10, 20),
                },
            ],
        }),
        Variant::NumberRange(NumberRange {
            min: -5.5,
            max: 0.0,
        }),
        Variant::Rect(Rect {
            min: Vector2::new(0.0, 0.0),
            max: Vector2::new(640.0, 480.5),
        }),
        Variant::PhysicalProperties(PhysicalProperties {
            density: 0.7,
            friction: 0.3,
            elasticity: 0.5,
            friction_weight: 1.0,
            elasticity_weight: 1.0,
        }),
    ]
}

#[test]
fn every_kind_survives_encode_then_decode() {
    for value in samples() {
        let wire = encode(&value);
        assert_eq!(wire[TYPE_TAG], value.kind().unwrap().as_str());
        let decoded = decode(&wire, None).unwrap();
        assert_eq!(decoded, value, "wire form was {wire}");
    }
}

#[test]
fn sample_set_covers_all_kinds() {
    let covered: Vec<Kind> = samples().iter().filter_map(Variant::kind).collect();
    for kind in Kind::ALL {
        assert!(covered.contains(&kind), "no sample for {kind}");
    }
}

#[test]
fn hinted_decode_accepts_matching_tag() {
    let value = Variant::Vector2(Vector2::new(1.0, 2.0));
    let decoded = decode(&encode(&value), Some(Kind::Vector2)).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn primitives_pass_through_unwrapped() {
    assert_eq!(encode(&Variant::Number(-0.5)), json!(-0.5));
    assert_eq!(encode(&Variant::String("hi".into())), json!("hi"));
    assert_eq!(encode(&Variant::Nil), json!(null));
    assert_eq!(decode(&json!(true), None).unwrap(), Variant::Bool(true));
    assert_eq!(decode(&json!(3), None).unwrap(), Variant::Number(3.0));
}

#[test]
fn unknown_tag_is_rejected() {
    let err = decode(&json!({ "_type": "Vector4", "x": 1 }), None).unwrap_err();
    assert_eq!(err, CodecError::UnknownType("Vector4".into()));
    assert_eq!(err.code(), "unknown_type");
}

#[test]
fn unknown_tag_inside_array_is_rejected() {
    let err = validate(&json!([1, { "_type": "Ray" }])).unwrap_err();
    assert!(matches!(err, CodecError::UnknownType(tag) if tag == "Ray"));
}

#[test]
fn missing_field_is_malformed() {
    let err = decode(&json!({ "_type": "Vector3", "x": 1, "y": 2 }), None).unwrap_err();
    match err {
        CodecError::Malformed { kind, reason } => {
            assert_eq!(kind, "Vector3");
            assert!(reason.contains('z'), "reason was {reason}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn short_cframe_is_malformed() {
    let err = decode(&json!({ "_type": "CFrame", "components": [0, 0, 0] }), None).unwrap_err();
    assert!(matches!(err, CodecError::Malformed { kind, .. } if kind == "CFrame"));
}

#[test]
fn color_channel_out_of_range_is_malformed() {
    let err = decode(&json!({ "_type": "Color3", "r": 300, "g": 0, "b": 0 }), None).unwrap_err();
    assert!(matches!(err, CodecError::Malformed { kind, .. } if kind == "Color3"));
}

#[test]
fn hint_mismatch_reports_both_kinds() {
    let err = decode(
        &json!({ "_type": "Vector2", "x": 0, "y": 0 }),
        Some(Kind::Vector3),
    )
    .unwrap_err();
    assert_eq!(
        err,
        CodecError::KindMismatch {
            expected: Kind::Vector3,
            found: "Vector2".into(),
        }
    );

    let err = decode(&json!("red"), Some(Kind::Color3)).unwrap_err();
    assert_eq!(err.to_string(), "expected Color3 value, found string");
}

#[test]
fn untagged_record_reads_as_hinted_kind() {
    let decoded = decode(&json!({ "x": -1, "y": 0.5, "z": 0 }), Some(Kind::Vector3)).unwrap();
    assert_eq!(decoded, Variant::Vector3(Vector3::new(-1.0, 0.5, 0.0)));
}

#[test]
fn non_string_tag_is_unknown() {
    let err = decode(&json!({ "_type": 3 }), None).unwrap_err();
    assert!(matches!(err, CodecError::UnknownType(_)));
}
