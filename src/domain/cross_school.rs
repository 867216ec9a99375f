//! Additive prerequisite links between schools, driven by text affinity.

use generational_arena::Index;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::build_config::BuildConfig;
use crate::domain::builder::SchoolTree;
use crate::domain::entities::Item;
use crate::domain::similarity::SimilarityIndex;

/// Chaos at or below this keeps schools separate.
pub const CHAOS_GATE: f64 = 0.3;

/// One applied link, lower tier → higher tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossLink {
    pub parent_school: String,
    pub parent: String,
    pub child_school: String,
    pub child: String,
}

struct Candidate {
    margin: f64,
    a: usize,
    b: usize,
}

/// Splice up to `max(1, floor(total·0.05·chaos))` links between schools.
#[instrument(level = "debug", skip_all, fields(schools = schools.len(), chaos = config.chaos))]
pub fn add_cross_school_links(schools: &mut [SchoolTree], config: &BuildConfig) -> Vec<CrossLink> {
    let chaos = config.chaos;
    if chaos <= CHAOS_GATE || schools.len() < 2 {
        return Vec::new();
    }

    let mut owners: Vec<(usize, Index)> = Vec::new();
    let mut items: Vec<&Item> = Vec::new();
    for (pos, school) in schools.iter().enumerate() {
        for (idx, node) in school.tree.nodes() {
            if let Some(item) = school.items.get(node.ordinal) {
                owners.push((pos, idx));
                items.push(item);
            }
        }
    }
    let sims = SimilarityIndex::build_text_only(&items, config.similarity_threshold as f32);
    let ids: Vec<String> = items.iter().map(|it| it.form_id.clone()).collect();

    let penalty = (1.0 - chaos) * 50.0;
    let mut candidates: Vec<Candidate> = sims
        .text_pairs()
        .into_iter()
        .filter(|((a, b), _)| owners[*a].0 != owners[*b].0)
        .filter_map(|((a, b), text)| {
            let affinity = f64::from(text) * 40.0;
            (affinity > penalty).then_some(Candidate {
                margin: affinity - penalty,
                a,
                b,
            })
        })
        .collect();
    candidates.sort_by(|x, y| {
        y.margin
            .total_cmp(&x.margin)
            .then_with(|| (&ids[x.a], &ids[x.b]).cmp(&(&ids[y.a], &ids[y.b])))
    });

    let limit = ((ids.len() as f64 * 0.05 * chaos).floor() as usize).max(1);
    let max = config.max_children;
    let mut links = Vec::new();
    for cand in candidates.iter().take(limit * 3) {
        if links.len() >= limit {
            break;
        }
        let (sa, ia) = owners[cand.a];
        let (sb, ib) = owners[cand.b];
        let (ta, tb) = (schools[sa].tree.node(ia).tier, schools[sb].tree.node(ib).tier);
        if ta == tb {
            continue;
        }
        let ((ps, pi), (cs, ci)) = if ta < tb { ((sa, ia), (sb, ib)) } else { ((sb, ib), (sa, ia)) };

        let parent = schools[ps].tree.node(pi);
        let child_id = schools[cs].tree.node(ci).form_id.clone();
        if parent.children.len() + parent.cross_children.len() >= max || parent.cross_children.contains(&child_id) {
            continue;
        }
        let parent_id = parent.form_id.clone();

        schools[ps].tree.node_mut(pi).cross_children.push(child_id.clone());
        schools[cs].tree.node_mut(ci).cross_prerequisites.push(parent_id.clone());
        links.push(CrossLink {
            parent_school: schools[ps].school.clone(),
            parent: parent_id,
            child_school: schools[cs].school.clone(),
            child: child_id,
        });
    }
    debug!(candidates = candidates.len(), applied = links.len(), limit, "cross-school links");
    links
}
