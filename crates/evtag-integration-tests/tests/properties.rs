//! Randomized attach/detach sequences against the naming and tagging laws.

use std::collections::BTreeSet;

use evtag_core::{EvidenceKind, OwnerRef};
use evtag_integration_tests::{deadline, Harness};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[derive(Debug, Clone)]
enum Step {
    Attach(usize),
    Detach(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..3usize).prop_map(Step::Attach),
        (0..3usize).prop_map(Step::Detach),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Every name in an owner scope is distinct, whatever gets uploaded.
    #[test]
    fn uploaded_names_never_collide(
        names in prop::collection::vec(
            prop_oneof![Just("report.pdf"), Just("report(1).pdf"), Just("notes"), Just("a.b.c")],
            1..12,
        )
    ) {
        let rt = runtime();
        rt.block_on(async {
            let h = Harness::new().unwrap();
            let room = h.dataroom("Audit").unwrap();
            for name in &names {
                h.upload_to(room, name).await.unwrap();
            }
            for owner in [room, h.drive()] {
                let listed = h.names_on(owner).unwrap();
                let distinct: BTreeSet<&String> = listed.iter().collect();
                prop_assert_eq!(listed.len(), names.len());
                prop_assert_eq!(distinct.len(), listed.len());
            }
            Ok(())
        })?;
    }

    /// Manual tags survive any interleaving of action item attaches and
    /// detaches, and propagated tags track the live set of owners.
    #[test]
    fn manual_tags_are_independent_of_propagation(
        steps in prop::collection::vec(step(), 1..16)
    ) {
        let rt = runtime();
        rt.block_on(async {
            let h = Harness::new().unwrap();
            let shared = h.tag("shared").unwrap();
            let manual = h.tag("manual").unwrap();
            let mut items = Vec::new();
            for n in 0..3 {
                let own = h.tag(&format!("c{n}")).unwrap();
                let item = h.action_item(&format!("A{n}")).unwrap();
                h.control(&format!("C{n}"), &[shared, own], &[item]).unwrap();
                items.push(item);
            }
            let e = h.upload_to(h.drive(), "evidence.pdf").await.unwrap();
            h.manager
                .link_tags(h.org, e, vec![manual, shared], vec![], deadline())
                .await
                .unwrap();

            let mut attached = BTreeSet::new();
            for step in &steps {
                match *step {
                    Step::Attach(n) => {
                        h.manager
                            .attach_existing(
                                h.owner(OwnerRef::ActionItem(items[n])),
                                vec![e],
                                EvidenceKind::File,
                                None,
                                deadline(),
                            )
                            .await
                            .unwrap();
                        attached.insert(n);
                    }
                    Step::Detach(n) => {
                        h.manager
                            .detach(h.owner(OwnerRef::ActionItem(items[n])), vec![e], deadline())
                            .await
                            .unwrap();
                        attached.remove(&n);
                    }
                }

                let row = h.evidence(e).unwrap();
                prop_assert_eq!(
                    &row.manual_tags,
                    &[manual, shared].into_iter().collect::<BTreeSet<_>>()
                );
                let mut expected: Vec<String> = vec!["manual".into(), "shared".into()];
                expected.extend(attached.iter().map(|n| format!("c{n}")));
                expected.sort();
                prop_assert_eq!(h.tag_names(e), expected);
            }
            Ok(())
        })?;
    }
}
