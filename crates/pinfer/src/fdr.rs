//! Target-decoy competition and q-value assignment
//!
//! Elias, J. E., & Gygi, S. P. (2007). Target-decoy search strategy for increased confidence
//! in large-scale protein identifications by mass spectrometry. Nature methods, 4(3), 207-214.
//! https://doi.org/10.1038/nmeth1019

use crate::graph::Graph;
use crate::grouping::AmbiguityGroup;
use crate::scoring::ScoreDirection;
use rayon::prelude::*;
use serde::Serialize;

struct Row<K> {
    ix: usize,
    key: K,
    score: f64,
    decoy: bool,
    fdr: f64,
    q: f64,
}

/// Rank rows best to worst, and estimate FDR and q-value at every rank
///
/// * FDR(i) = decoys(1..=i) / max(targets(1..=i), 1), clamped to [0, 1]
/// * q(i) = min(FDR(j) for j >= i)
fn target_decoy<K: Ord + Send>(rows: &mut [Row<K>], direction: ScoreDirection) {
    rows.par_sort_by(|a, b| {
        direction
            .cmp(a.score, b.score)
            .then_with(|| a.key.cmp(&b.key))
    });

    let mut decoy = 0usize;
    let mut target = 0usize;
    for row in rows.iter_mut() {
        match row.decoy {
            true => decoy += 1,
            false => target += 1,
        }
        row.fdr = (decoy as f64 / target.max(1) as f64).clamp(0.0, 1.0);
    }

    // Reverse slice, and calculate the cumulative minimum
    let mut q_min = 1.0f64;
    for row in rows.iter_mut().rev() {
        q_min = q_min.min(row.fdr);
        row.q = q_min;
    }
}

/// Assign FDR and q-values to scored groups. Returns every group: scored
/// groups ranked best to worst (ties broken by representative accession),
/// followed by unscored groups sorted by representative, which get no q-value
pub fn compute_q_values(
    groups: Vec<AmbiguityGroup>,
    direction: ScoreDirection,
) -> Vec<AmbiguityGroup> {
    let (scored, mut unscored): (Vec<_>, Vec<_>) =
        groups.into_iter().partition(AmbiguityGroup::is_scored);

    let mut rows = scored
        .iter()
        .enumerate()
        .filter_map(|(ix, group)| {
            group.score.map(|score| Row {
                ix,
                key: group.representative.clone(),
                score,
                decoy: group.decoy,
                fdr: 1.0,
                q: 1.0,
            })
        })
        .collect::<Vec<_>>();
    target_decoy(&mut rows, direction);

    let mut slots = scored.into_iter().map(Some).collect::<Vec<_>>();
    let mut ranked = Vec::with_capacity(slots.len() + unscored.len());
    for row in rows {
        if let Some(mut group) = slots[row.ix].take() {
            group.fdr = Some(row.fdr);
            group.q_value = Some(row.q);
            ranked.push(group);
        }
    }

    unscored.sort_by(|a, b| a.representative.cmp(&b.representative));
    for mut group in unscored {
        group.fdr = None;
        group.q_value = None;
        ranked.push(group);
    }
    ranked
}

/// Assign PSM-level FDR and q-values using `score_kind`. PSMs lacking that
/// score are left without statistics, even if an earlier pass ranked them.
/// Returns the number of ranked PSMs
pub fn assign_psm_q_values(graph: &mut Graph, score_kind: &str, direction: ScoreDirection) -> usize {
    for psm in graph.psms.iter_mut() {
        psm.set_statistics(None, None);
    }

    let statistics = {
        let mut rows = graph
            .psms()
            .iter()
            .enumerate()
            .filter_map(|(ix, psm)| {
                psm.score(score_kind).map(|score| Row {
                    ix,
                    key: (psm.spectrum(), psm.charge(), psm.peptide().as_ref()),
                    score,
                    decoy: psm.is_decoy(),
                    fdr: 1.0,
                    q: 1.0,
                })
            })
            .collect::<Vec<_>>();
        target_decoy(&mut rows, direction);
        rows.into_iter()
            .map(|row| (row.ix, row.fdr, row.q))
            .collect::<Vec<_>>()
    };

    let ranked = statistics.len();
    for (ix, fdr, q) in statistics {
        graph.psms[ix].set_statistics(Some(fdr), Some(q));
    }
    ranked
}

/// Groups accepted at a q-value threshold
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Passing {
    pub targets: usize,
    pub decoys: usize,
    /// Largest q-value among accepted groups, if any were accepted
    pub q_value: Option<f64>,
}

pub fn count_passing(groups: &[AmbiguityGroup], threshold: f64) -> Passing {
    groups
        .iter()
        .filter_map(|group| group.q_value.map(|q| (q, group.decoy)))
        .filter(|(q, _)| *q <= threshold)
        .fold(Passing::default(), |mut acc, (q, decoy)| {
            match decoy {
                true => acc.decoys += 1,
                false => acc.targets += 1,
            }
            acc.q_value = Some(acc.q_value.map_or(q, |max: f64| max.max(q)));
            acc
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grouping::Member;
    use quickcheck_macros::quickcheck;
    use std::sync::Arc;

    fn group(accession: &str, score: Option<f64>, decoy: bool) -> AmbiguityGroup {
        let accession: Arc<str> = Arc::from(accession);
        AmbiguityGroup {
            component: 0,
            representative: accession.clone(),
            members: vec![Member {
                protein: crate::graph::ProteinIx(0),
                accession,
                subsumed: false,
            }],
            peptides: vec![],
            psms: vec![],
            decoy,
            score,
            fdr: None,
            q_value: None,
        }
    }

    #[test]
    fn interleaved_decoys() {
        let groups = (0..10)
            .map(|i| {
                let rank = i + 1;
                group(
                    &format!("protein_{:02}", rank),
                    Some(10.0 - i as f64),
                    rank % 2 == 0,
                )
            })
            .collect::<Vec<_>>();

        let ranked = compute_q_values(groups, ScoreDirection::HigherIsBetter);
        let q = ranked.iter().map(|g| g.q_value.unwrap()).collect::<Vec<_>>();
        let fdr = ranked.iter().map(|g| g.fdr.unwrap()).collect::<Vec<_>>();

        assert_eq!(ranked[0].representative.as_ref(), "protein_01");
        assert_eq!(q[0], 0.0);
        assert_eq!(q[9], 1.0);
        assert_eq!(fdr[1], 1.0);
        assert_eq!(q[1], 0.5);
        assert_eq!(q[8], 0.8);
        assert!(q.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn lower_is_better_and_ties() {
        let groups = vec![
            group("B", Some(0.01), false),
            group("A", Some(0.01), true),
            group("C", Some(0.5), false),
            group("D", None, false),
        ];
        let ranked = compute_q_values(groups, ScoreDirection::LowerIsBetter);
        let order = ranked
            .iter()
            .map(|g| g.representative.to_string())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["A", "B", "C", "D"]);

        // Decoy at the top, with no targets yet: FDR is 1.0 rather than infinite
        assert_eq!(ranked[0].fdr, Some(1.0));
        assert_eq!(ranked[1].fdr, Some(1.0));
        assert_eq!(ranked[2].fdr, Some(0.5));
        assert_eq!(ranked[0].q_value, Some(0.5));
        assert_eq!(ranked[3].q_value, None);
        assert_eq!(ranked[3].fdr, None);
    }

    #[test]
    fn passing_at_threshold() {
        let groups = (0..10)
            .map(|i| group(&format!("P{}", i), Some(10.0 - i as f64), i == 5 || i == 9))
            .collect::<Vec<_>>();
        let ranked = compute_q_values(groups, ScoreDirection::HigherIsBetter);

        let passing = count_passing(&ranked, 0.0);
        assert_eq!(passing.targets, 5);
        assert_eq!(passing.decoys, 0);
        assert_eq!(passing.q_value, Some(0.0));

        let passing = count_passing(&ranked, 0.2);
        assert_eq!(passing.targets, 8);
        assert_eq!(passing.decoys, 1);

        assert_eq!(count_passing(&[], 0.01), Passing::default());
    }

    #[test]
    fn psm_ties_within_a_spectrum() {
        use crate::psm::test::record;
        use crate::psm::{adapt, DecoyPolicy};

        // Two candidate peptides for the same spectrum and charge, tied on score
        let records = vec![
            record("scan=1", "BBB", 10.0, &[("rev_P2", true)]),
            record("scan=1", "AAA", 10.0, &[("P1", false)]),
        ];
        for order in [records.clone(), records.into_iter().rev().collect()] {
            let (mut graph, _) = Graph::build(
                order
                    .into_iter()
                    .enumerate()
                    .map(|(ix, raw)| adapt(ix, raw, DecoyPolicy::All).unwrap().psm),
            );
            assert_eq!(
                assign_psm_q_values(&mut graph, "score", ScoreDirection::HigherIsBetter),
                2
            );
            let q = |peptide: &str| {
                graph
                    .psms()
                    .iter()
                    .find(|psm| psm.peptide().as_ref() == peptide)
                    .and_then(|psm| psm.q_value())
            };
            assert_eq!(q("AAA"), Some(0.0));
            assert_eq!(q("BBB"), Some(1.0));
        }
    }

    #[quickcheck]
    fn q_values_are_monotonic(data: Vec<(i16, bool)>, lower: bool) -> bool {
        let direction = match lower {
            true => ScoreDirection::LowerIsBetter,
            false => ScoreDirection::HigherIsBetter,
        };
        let groups = data
            .iter()
            .enumerate()
            .map(|(ix, (score, decoy))| group(&format!("P{}", ix), Some(*score as f64), *decoy))
            .collect::<Vec<_>>();
        let ranked = compute_q_values(groups, direction);

        let q = ranked.iter().filter_map(|g| g.q_value).collect::<Vec<_>>();
        q.len() == data.len()
            && q.iter().all(|q| (0.0..=1.0).contains(q))
            && q.windows(2).all(|w| w[0] <= w[1])
            && ranked
                .windows(2)
                .all(|w| direction.cmp(w[0].score.unwrap(), w[1].score.unwrap()).is_le())
    }
}
