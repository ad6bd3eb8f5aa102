use std::collections::HashMap;

use crate::ocr::{Line, LineBox, TokenDetection};

use super::geom::union_bbox;

struct LineGroup<'a> {
    tokens: Vec<&'a TokenDetection>,
    bbox: LineBox,
}

/// Groups tokens by their exact `(block, line)` key.
///
/// Lines keep the order in which their key first appears in `tokens`, which is
/// the reading order the backend emitted. Groups whose joined text is blank
/// are dropped.
pub fn aggregate_lines(tokens: &[TokenDetection]) -> Vec<Line> {
    let mut order: Vec<(u32, u32)> = Vec::new();
    let mut groups: HashMap<(u32, u32), LineGroup<'_>> = HashMap::new();

    for token in tokens {
        let key = token.key();
        let token_box = LineBox::of_token(token);
        match groups.get_mut(&key) {
            Some(group) => {
                group.bbox = union_bbox(&group.bbox, &token_box);
                group.tokens.push(token);
            }
            None => {
                order.push(key);
                groups.insert(
                    key,
                    LineGroup {
                        tokens: vec![token],
                        bbox: token_box,
                    },
                );
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .filter_map(build_line)
        .collect()
}

fn build_line(group: LineGroup<'_>) -> Option<Line> {
    let text = group
        .tokens
        .iter()
        .map(|token| token.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut conf_sum = 0.0;
    let mut weight_sum = 0.0;
    for token in &group.tokens {
        let weight = token.text.chars().count().max(1) as f32;
        conf_sum += token.conf * weight;
        weight_sum += weight;
    }
    let conf = if weight_sum > 0.0 {
        conf_sum / weight_sum
    } else {
        0.0
    };

    Some(Line {
        text: text.to_string(),
        bbox: group.bbox,
        conf,
    })
}
