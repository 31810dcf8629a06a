//! Streaming result writer.
//!
//! One comma-delimited row per test unit, written as soon as the unit is
//! done. The layout depends on the grouping and on whether the test
//! reports effects (LRT):
//!
//! | grouping  | score                                                  | lrt                         |
//! |-----------|--------------------------------------------------------|-----------------------------|
//! | single    | `chr,pos,id,maf,hwe_pval,pval`                         | adds `effect` before `pval` |
//! | window    | `start_chr,start_pos,start_id,end_chr,end_pos,end_id,pval` | adds `l2norm_effect`    |
//! | named set | `snpset_id,n_members,pval`                             | adds `l2norm_effect`        |
//! | explicit  | one summary line, no header                            | summary with the l2 norm    |

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use ordgwas_geno::traits::VariantInfo;

use crate::score_test::{TestKind, UnitStatistic};

/// Row layout, fixed for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Single,
    Window,
    NamedSets,
    Explicit,
}

/// Everything a row can report about one unit.
#[derive(Debug, Clone, Copy)]
pub struct UnitReport<'a> {
    pub first: &'a VariantInfo,
    pub last: &'a VariantInfo,
    pub name: Option<&'a str>,
    pub n_members: usize,
    /// Single-variant diagnostics.
    pub maf: f64,
    pub hwe_pval: f64,
    pub stat: &'a UnitStatistic,
}

pub struct ResultWriter<W: Write> {
    out: W,
    layout: Layout,
    kind: TestKind,
    rows: usize,
}

impl ResultWriter<BufWriter<File>> {
    /// Create the output file and write the header.
    pub fn create(path: &Path, layout: Layout, kind: TestKind) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Self::new(BufWriter::new(file), layout, kind)
    }
}

impl<W: Write> ResultWriter<W> {
    pub fn new(mut out: W, layout: Layout, kind: TestKind) -> Result<Self> {
        if let Some(header) = header(layout, kind) {
            writeln!(out, "{}", header)?;
        }
        Ok(Self {
            out,
            layout,
            kind,
            rows: 0,
        })
    }

    pub fn write_unit(&mut self, report: &UnitReport<'_>) -> Result<()> {
        let pval = fmt_value(report.stat.pvalue);
        let lrt = self.kind == TestKind::Lrt;
        match self.layout {
            Layout::Single => {
                let v = report.first;
                write!(
                    self.out,
                    "{},{},{},{},{},",
                    v.chrom,
                    v.pos,
                    v.id,
                    fmt_value(report.maf),
                    fmt_value(report.hwe_pval)
                )?;
                if lrt {
                    write!(self.out, "{},", fmt_value(first_effect(report.stat)))?;
                }
                writeln!(self.out, "{}", pval)?;
            }
            Layout::Window => {
                let (a, b) = (report.first, report.last);
                write!(
                    self.out,
                    "{},{},{},{},{},{},",
                    a.chrom, a.pos, a.id, b.chrom, b.pos, b.id
                )?;
                if lrt {
                    write!(self.out, "{},", fmt_value(l2norm(report.stat)))?;
                }
                writeln!(self.out, "{}", pval)?;
            }
            Layout::NamedSets => {
                write!(
                    self.out,
                    "{},{},",
                    report.name.unwrap_or(""),
                    report.n_members
                )?;
                if lrt {
                    write!(self.out, "{},", fmt_value(l2norm(report.stat)))?;
                }
                writeln!(self.out, "{}", pval)?;
            }
            Layout::Explicit => {
                let (a, b) = (report.first, report.last);
                write!(
                    self.out,
                    "Joint {} test of {} variants from {}:{} {} to {}:{} {}: ",
                    self.kind.name(),
                    report.n_members,
                    a.chrom,
                    a.pos,
                    a.id,
                    b.chrom,
                    b.pos,
                    b.id
                )?;
                if lrt {
                    write!(self.out, "l2norm_effect = {}, ", fmt_value(l2norm(report.stat)))?;
                }
                writeln!(self.out, "pval = {}", pval)?;
            }
        }
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush().context("Failed to flush results")?;
        Ok(self.out)
    }
}

fn header(layout: Layout, kind: TestKind) -> Option<String> {
    let lrt = kind == TestKind::Lrt;
    let leading = match layout {
        Layout::Single => "chr,pos,id,maf,hwe_pval",
        Layout::Window => "start_chr,start_pos,start_id,end_chr,end_pos,end_id",
        Layout::NamedSets => "snpset_id,n_members",
        Layout::Explicit => return None,
    };
    let effect = match (layout, lrt) {
        (_, false) => "",
        (Layout::Single, true) => ",effect",
        (_, true) => ",l2norm_effect",
    };
    Some(format!("{}{},pval", leading, effect))
}

fn first_effect(stat: &UnitStatistic) -> f64 {
    stat.effects
        .as_ref()
        .and_then(|e| e.first().copied())
        .unwrap_or(f64::NAN)
}

/// Euclidean norm of the effect vector (NaN if any effect is NaN).
pub fn l2norm(stat: &UnitStatistic) -> f64 {
    match &stat.effects {
        Some(e) => e.iter().map(|b| b * b).sum::<f64>().sqrt(),
        None => f64::NAN,
    }
}

/// Decimal text; scientific notation outside the readable range.
fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == 0.0 || (1e-4..1e15).contains(&v.abs()) {
        format!("{}", v)
    } else {
        format!("{:e}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(chrom: &str, pos: u64, id: &str) -> VariantInfo {
        VariantInfo {
            chrom: chrom.into(),
            pos,
            id: id.into(),
            ..VariantInfo::default()
        }
    }

    fn stat(pvalue: f64, effects: Option<Vec<f64>>) -> UnitStatistic {
        UnitStatistic {
            statistic: 1.0,
            df: 1,
            pvalue,
            effects,
        }
    }

    fn render(layout: Layout, kind: TestKind, report: &UnitReport<'_>) -> Vec<String> {
        let mut w = ResultWriter::new(Vec::new(), layout, kind).unwrap();
        w.write_unit(report).unwrap();
        let bytes = w.finish().unwrap();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn test_single_layouts() {
        let v = info("1", 100, "rs1");
        let s = stat(0.25, Some(vec![-0.5]));
        let report = UnitReport {
            first: &v,
            last: &v,
            name: None,
            n_members: 1,
            maf: 0.125,
            hwe_pval: 1.0,
            stat: &s,
        };
        assert_eq!(
            render(Layout::Single, TestKind::Score, &report),
            vec!["chr,pos,id,maf,hwe_pval,pval", "1,100,rs1,0.125,1,0.25"]
        );
        assert_eq!(
            render(Layout::Single, TestKind::Lrt, &report),
            vec!["chr,pos,id,maf,hwe_pval,effect,pval", "1,100,rs1,0.125,1,-0.5,0.25"]
        );
    }

    #[test]
    fn test_window_and_set_layouts() {
        let (a, b) = (info("2", 10, "a"), info("2", 90, "b"));
        let s = stat(1e-9, Some(vec![3.0, 4.0]));
        let report = UnitReport {
            first: &a,
            last: &b,
            name: Some("GENE1"),
            n_members: 2,
            maf: f64::NAN,
            hwe_pval: f64::NAN,
            stat: &s,
        };
        assert_eq!(
            render(Layout::Window, TestKind::Lrt, &report),
            vec![
                "start_chr,start_pos,start_id,end_chr,end_pos,end_id,l2norm_effect,pval",
                "2,10,a,2,90,b,5,1e-9"
            ]
        );
        assert_eq!(
            render(Layout::NamedSets, TestKind::Score, &report),
            vec!["snpset_id,n_members,pval", "GENE1,2,1e-9"]
        );
    }

    #[test]
    fn test_explicit_summary_has_no_header() {
        let (a, b) = (info("1", 5, "x"), info("1", 50, "y"));
        let s = stat(0.5, Some(vec![0.0, 0.0, 0.0]));
        let report = UnitReport {
            first: &a,
            last: &b,
            name: None,
            n_members: 3,
            maf: f64::NAN,
            hwe_pval: f64::NAN,
            stat: &s,
        };
        let lines = render(Layout::Explicit, TestKind::Lrt, &report);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Joint lrt test of 3 variants"));
        assert!(lines[0].ends_with("l2norm_effect = 0, pval = 0.5"));
    }

    #[test]
    fn test_nan_sentinel() {
        assert_eq!(fmt_value(f64::NAN), "NaN");
        assert_eq!(fmt_value(0.0), "0");
        assert!(l2norm(&stat(f64::NAN, Some(vec![f64::NAN, 1.0]))).is_nan());
    }
}
