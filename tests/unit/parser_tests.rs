// Operation grammar tests

use imgpipe::pipeline::{OperationKind, Pipeline};

#[test]
fn test_parse_preserves_operation_order() {
    let pipeline =
        Pipeline::parse("image/quality,q_80/resize,w_300,h_200/watermark,text_aGk/quality,q_50")
            .unwrap();

    let kinds: Vec<OperationKind> = pipeline.iter().map(|op| op.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            OperationKind::Quality,
            OperationKind::Resize,
            OperationKind::Watermark,
            OperationKind::Quality,
        ]
    );
    assert!(pipeline.has_watermark());
}

#[test]
fn test_display_then_parse_gives_same_pipeline() {
    let input = "image/resize,m_fixed,w_120,h_90/watermark,g_nw,text_SGVsbG8,x_5/rotate,d_90";
    let pipeline = Pipeline::parse(input).unwrap();
    let reparsed = Pipeline::parse(&pipeline.to_string()).unwrap();
    assert_eq!(pipeline, reparsed);
}

#[test]
fn test_value_keeps_everything_after_first_underscore() {
    let pipeline = Pipeline::parse("image/watermark,text_a_b_c").unwrap();
    assert_eq!(pipeline.operations()[0].param("text"), Some("a_b_c"));
}

#[test]
fn test_repeated_key_last_wins() {
    let pipeline = Pipeline::parse("image/resize,w_100,w_200").unwrap();
    assert_eq!(pipeline.operations()[0].param("w"), Some("200"));
}

#[test]
fn test_unknown_operation_is_accepted_by_the_parser() {
    let pipeline = Pipeline::parse("image/resize,w_10/sharpen,s_3").unwrap();
    assert_eq!(
        pipeline.operations()[1].kind(),
        OperationKind::Unknown("sharpen".to_string())
    );
}
