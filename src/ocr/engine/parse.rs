use std::collections::HashMap;

use crate::ocr::TokenDetection;

const WORD_LEVEL: i32 = 5;

/// Tesseract numbers lines per paragraph; the aggregator groups on
/// (block, line) only, so line indices are renumbered to be unique within a
/// block. Both indices become 0-based, in order of first appearance.
#[derive(Default)]
struct IndexNormalizer {
    blocks: HashMap<(i32, i32), u32>,
    lines: HashMap<(u32, i32, i32), u32>,
    next_line: HashMap<u32, u32>,
}

impl IndexNormalizer {
    fn block(&mut self, page: i32, block: i32) -> u32 {
        let next = self.blocks.len() as u32;
        *self.blocks.entry((page, block)).or_insert(next)
    }

    fn line(&mut self, block: u32, par: i32, line: i32) -> u32 {
        if let Some(existing) = self.lines.get(&(block, par, line)) {
            return *existing;
        }
        let counter = self.next_line.entry(block).or_insert(0);
        let assigned = *counter;
        *counter += 1;
        self.lines.insert((block, par, line), assigned);
        assigned
    }
}

pub(super) fn parse_tsv_tokens(tsv: &str) -> Vec<TokenDetection> {
    let mut normalizer = IndexNormalizer::default();
    let mut tokens = Vec::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != WORD_LEVEL {
            continue;
        }
        let text = cols[11].trim();
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        let page_num: i32 = cols[1].parse().unwrap_or(0);
        let block_num: i32 = cols[2].parse().unwrap_or(0);
        let par_num: i32 = cols[3].parse().unwrap_or(0);
        let line_num: i32 = cols[4].parse().unwrap_or(0);

        let block = normalizer.block(page_num, block_num);
        let line = normalizer.line(block, par_num, line_num);
        tokens.push(TokenDetection {
            text: text.to_string(),
            left: cols[6].parse().unwrap_or(0),
            top: cols[7].parse().unwrap_or(0),
            width: cols[8].parse().unwrap_or(0),
            height: cols[9].parse().unwrap_or(0),
            conf,
            block,
            line,
        });
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::aggregate_lines;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn reads_word_rows_only() {
        let input = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t200\t100\t-1\t",
            "4\t1\t1\t1\t1\t0\t10\t10\t80\t12\t-1\t",
            "5\t1\t1\t1\t1\t1\t10\t10\t30\t12\t96.4\tHello",
            "5\t1\t1\t1\t1\t2\t45\t11\t40\t11\t91\tthere",
            "5\t1\t1\t1\t1\t3\t90\t11\t5\t11\t12\t ",
        ]);
        let tokens = parse_tsv_tokens(&input);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "Hello");
        assert_eq!((tokens[0].left, tokens[0].top, tokens[0].width, tokens[0].height), (10, 10, 30, 12));
        assert!((tokens[0].conf - 96.4).abs() < 1e-4);
        assert_eq!(tokens[1].key(), (0, 0));
    }

    #[test]
    fn two_blocks_produce_two_lines() {
        let input = tsv(&[
            "5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tHello",
            "5\t1\t2\t1\t1\t1\t0\t40\t10\t10\t90\tWorld",
        ]);
        let tokens = parse_tsv_tokens(&input);
        assert_eq!(tokens[0].key(), (0, 0));
        assert_eq!(tokens[1].key(), (1, 0));
        let lines = aggregate_lines(&tokens);
        let texts = lines.iter().map(|line| line.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["Hello", "World"]);
    }

    #[test]
    fn paragraphs_in_one_block_do_not_collide() {
        let input = tsv(&[
            "5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tfirst",
            "5\t1\t1\t2\t1\t1\t0\t30\t10\t10\t90\tsecond",
            "5\t1\t1\t2\t2\t1\t0\t50\t10\t10\t90\tthird",
        ]);
        let tokens = parse_tsv_tokens(&input);
        let keys = tokens.iter().map(TokenDetection::key).collect::<Vec<_>>();
        assert_eq!(keys, vec![(0, 0), (0, 1), (0, 2)]);
    }

    #[test]
    fn malformed_rows_are_ignored() {
        let input = tsv(&["5\t1\t1", "garbage", "5\t1\t1\t1\t1\t1\tx\t0\t10\t10\t90\tok"]);
        let tokens = parse_tsv_tokens(&input);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].left, 0);
    }
}
