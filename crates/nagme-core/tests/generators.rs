#![allow(dead_code)]

use nagme_core::event::{CompleteData, DeleteData, EventData, NagEvent, NagPatch, PushData};
use nagme_core::model::{NagId, Recurrence};
use proptest::prelude::*;

pub fn nag_id(raw: &str) -> NagId {
    NagId::new(raw).expect("valid id")
}

pub fn arb_recurrence() -> impl Strategy<Value = Recurrence> + Clone {
    (1i64..50, 0i64..100)
        .prop_flat_map(|(period, anchor)| (Just(period), Just(anchor), 1i64..=period))
        .prop_map(|(period, anchor, window)| Recurrence::every(period, anchor, window))
}

pub fn arb_patch() -> impl Strategy<Value = NagPatch> + Clone {
    (
        proptest::option::of("[a-z]{1,8}"),
        proptest::option::of(prop_oneof![
            Just("Work".to_string()),
            Just("Personal".to_string()),
            Just("Project".to_string()),
        ]),
        proptest::option::of(proptest::option::of(0i64..1_000)),
        proptest::option::of(proptest::option::of(arb_recurrence())),
        proptest::option::of(0u32..=100),
    )
        .prop_map(|(title, bucket, due_ms, recurrence, weight)| NagPatch {
            title,
            bucket,
            due_ms,
            recurrence,
            weight,
            ..NagPatch::default()
        })
}

pub fn arb_data() -> impl Strategy<Value = EventData> + Clone {
    prop_oneof![
        3 => arb_patch().prop_map(EventData::Create),
        4 => arb_patch().prop_map(EventData::Update),
        2 => proptest::option::of(0i64..1_000).prop_map(|occurrence_ms| {
            EventData::Complete(CompleteData {
                occurrence_ms,
                ..CompleteData::default()
            })
        }),
        1 => Just(EventData::Delete(DeleteData::default())),
        2 => (1i64..500).prop_map(|by| EventData::Push(PushData::new(by))),
    ]
}

/// History of one nag. Event ids are unique; timestamps often collide.
pub fn arb_history(nag: &'static str, max_len: usize) -> impl Strategy<Value = Vec<NagEvent>> {
    proptest::collection::vec((0i64..40, arb_data()), 1..max_len).prop_map(move |items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (ts, data))| NagEvent::new(format!("{nag}-{i:03}"), nag_id(nag), ts, data))
            .collect()
    })
}

/// Histories for a few nags, interleaved.
pub fn arb_log() -> impl Strategy<Value = Vec<NagEvent>> {
    (arb_history("alpha", 12), arb_history("beta", 12), arb_history("gamma", 6)).prop_map(
        |(a, b, c)| {
            let mut all = a;
            all.extend(b);
            all.extend(c);
            all
        },
    )
}
