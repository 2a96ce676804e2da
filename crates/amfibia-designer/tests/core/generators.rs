use amfibia_designer::generators::{
    block_prep_groups, polishing_group, BlockPrepMode, BlockPrepParams, MillingStage,
    PolishingParams,
};
use amfibia_designer::model::{PatternShape, ScanType};
use amfibia_designer::transform::ImageFrame;
use amfibia_designer::GroupColor;

fn frame() -> ImageFrame {
    ImageFrame::new(1536, 1024, 300e-6, 200e-6)
}

#[test]
fn test_block_prep_default_groups() {
    let groups = block_prep_groups(&BlockPrepParams::default(), &frame()).unwrap();
    assert_eq!(groups.len(), 3);

    let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
    assert_eq!(sizes, vec![1, 8, 5]);

    let currents: Vec<f64> = groups.iter().map(|g| g.milling_current).collect();
    assert_eq!(currents, vec![65e-9, 50e-9, 15e-9]);

    let seq: Vec<u32> = groups.iter().map(|g| g.sequential_group).collect();
    assert_eq!(seq, vec![0, 0, 1]);

    assert_eq!(groups[0].color, GroupColor::for_index(0));
    assert_eq!(groups[2].color, GroupColor::for_index(2));

    for group in &groups {
        for pattern in group.patterns() {
            let pattern = pattern.pattern();
            assert_eq!(pattern.attributes.scan_type, ScanType::Serpentine);
            assert_eq!(pattern.attributes.application_file, "Si");
            match &pattern.shape {
                PatternShape::Rectangle(rect) => {
                    assert!(rect.width > 0.0 && rect.height > 0.0);
                }
                other => panic!("unexpected shape {:?}", other),
            }
        }
    }
}

#[test]
fn test_block_prep_planar_and_disabled_stage() {
    let mut params = BlockPrepParams {
        mode: BlockPrepMode::Planar,
        ..Default::default()
    };
    params.coarse.enabled = false;

    let groups = block_prep_groups(&params, &frame()).unwrap();
    assert_eq!(groups.len(), 2);
    // medium loses the needle gap in planar mode
    assert_eq!(groups[0].len(), MillingStage::Medium.pattern_indices().len() - 1);
    assert_eq!(groups[0].color, GroupColor::for_index(0));
}

#[test]
fn test_block_prep_rejects_bad_angle() {
    let params = BlockPrepParams {
        milling_angle_deg: 0.0,
        ..Default::default()
    };
    assert!(block_prep_groups(&params, &frame()).is_err());
}

#[test]
fn test_polishing_group() {
    let group = polishing_group(&PolishingParams::default(), &frame()).unwrap();
    assert_eq!(group.len(), 2);
    assert_eq!(group.milling_current, 0.1e-9);
    assert_eq!(group.sequential_group, 0);
    for pattern in group.patterns() {
        assert_eq!(pattern.pixel_vertices().len(), 20);
    }
}
