use retrace::{hash_sequencing_key, Segment, SequenceToken, TrackedEvent};

fn event(key: &[u8]) -> TrackedEvent {
    TrackedEvent::new(SequenceToken::new(0), "e", key, b"payload".as_slice())
}

#[test]
fn root_segment_matches_every_key() {
    for key in [b"order-1".as_slice(), b"order-2", b"", b"anything"] {
        assert!(Segment::ROOT.matches(hash_sequencing_key(key)));
        assert!(Segment::ROOT.matches_event(&event(key)));
    }
}

#[test]
fn fnv_hash_is_stable() {
    assert_eq!(hash_sequencing_key(b""), 0xcbf29ce484222325);
    assert_eq!(hash_sequencing_key(b"order-1"), hash_sequencing_key(b"order-1"));
    assert_ne!(hash_sequencing_key(b"order-1"), hash_sequencing_key(b"order-2"));
}

#[test]
fn split_produces_disjoint_children_covering_the_parent() {
    let (left, right) = Segment::ROOT.split();
    assert_eq!(left, Segment::new(0, 1));
    assert_eq!(right, Segment::new(1, 1));

    for n in 0u32..64 {
        let key = format!("aggregate-{n}");
        let hash = hash_sequencing_key(key.as_bytes());
        let in_left = left.matches(hash);
        let in_right = right.matches(hash);
        assert!(in_left != in_right, "key {key} must land in exactly one child");
    }
}

#[test]
fn splitting_a_child_narrows_the_mask() {
    let (left, _) = Segment::ROOT.split();
    let (first, second) = left.split();
    assert_eq!(first, Segment::new(0, 3));
    assert_eq!(second, Segment::new(2, 3));
}

#[test]
fn compute_segments_restores_masks_for_an_even_split() {
    let segments = Segment::compute_segments(&[0, 1, 2, 3]);
    assert_eq!(
        segments,
        vec![
            Segment::new(0, 3),
            Segment::new(1, 3),
            Segment::new(2, 3),
            Segment::new(3, 3),
        ]
    );
}

#[test]
fn compute_segments_restores_masks_for_an_uneven_split() {
    // Root split once, then segment 1 split again.
    let segments = Segment::compute_segments(&[0, 1, 3]);
    assert_eq!(
        segments,
        vec![Segment::new(0, 1), Segment::new(1, 3), Segment::new(3, 3)]
    );
}

#[test]
fn compute_segments_of_single_id_yields_the_root() {
    assert_eq!(Segment::compute_segments(&[0]), vec![Segment::ROOT]);
    assert_eq!(Segment::compute_segments(&[]), Vec::<Segment>::new());
}

#[test]
fn every_key_matches_exactly_one_computed_segment() {
    let segments = Segment::compute_segments(&[0, 1, 3]);
    for n in 0u32..256 {
        let hash = hash_sequencing_key(format!("aggregate-{n}").as_bytes());
        let matching = segments.iter().filter(|segment| segment.matches(hash)).count();
        assert_eq!(matching, 1, "hash {hash:#x} matched {matching} segments");
    }
}

#[test]
fn split_round_trips_through_compute_segments() {
    let (left, right) = Segment::ROOT.split();
    let (ll, lr) = left.split();
    let ids = vec![ll.segment_id(), lr.segment_id(), right.segment_id()];
    let restored = Segment::compute_segments(&ids);
    assert_eq!(restored, vec![ll, right, lr]);
}
