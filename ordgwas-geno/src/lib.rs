//! ordgwas-geno: Genotype and input-file access for ordgwas.
//!
//! Provides the VariantSource trait with PLINK bed/bim/fam (random
//! access) and VCF (forward-only) backends, transparent decompression,
//! sample/variant selectors, the snp-set mapping file, and the covariate
//! table read when fitting the null model.

pub mod compression;
pub mod materialized;
pub mod phenotype;
pub mod plink;
pub mod selection;
pub mod snpset_file;
pub mod traits;
pub mod vcf;

pub use compression::SourceError;
pub use materialized::MaterializedSource;
pub use plink::PlinkSource;
pub use selection::Selection;
pub use snpset_file::{SnpSet, SnpSetMapping};
pub use traits::{AccessPattern, ClassCounts, GenotypeBlock, VariantInfo, VariantSource};
pub use vcf::{VcfDataKind, VcfSource};
