//! Time-bounded exemption tables
//!
//! The allowlist suppresses compatibility checks for schemas whose rendered
//! form matches a name pattern (and, optionally, an argument pattern). The
//! don't-parse list skips snapshot lines the parser does not understand yet.
//!
//! Every entry carries an expiry date. Tables are compiled once against
//! "today": expired entries are dropped at that point and can never match,
//! even though they stay in the source table.
//!
//! Patterns are regular expressions searched anywhere in the rendered schema,
//! so an unescaped `.` matches any character. Declaration order matters: the
//! first entry whose name pattern matches decides the verdict.

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::schema::Schema;

/// An allowlist entry as declared in source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowlistRule {
    /// Regex searched in the rendered schema
    pub name: &'static str,
    /// Last day the entry applies, `YYYY-MM-DD`
    pub expires: &'static str,
    /// Optional regex the rendered schema must also match
    pub args: Option<&'static str>,
}

impl AllowlistRule {
    pub const fn new(name: &'static str, expires: &'static str) -> Self {
        Self { name, expires, args: None }
    }

    pub const fn with_args(name: &'static str, expires: &'static str, args: &'static str) -> Self {
        Self { name, expires, args: Some(args) }
    }
}

/// A don't-parse entry as declared in source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DontParseRule {
    /// Regex searched in the raw snapshot line
    pub pattern: &'static str,
    /// Last day the entry applies, `YYYY-MM-DD`
    pub expires: &'static str,
}

impl DontParseRule {
    pub const fn new(pattern: &'static str, expires: &'static str) -> Self {
        Self { pattern, expires }
    }
}

// If an operator NEVER gets a compatibility guarantee, pick a date arbitrarily
// far in the future. Otherwise pick a date by which the change will have landed.
// Entries may be deleted once their date has passed.
pub const DEFAULT_ALLOWLIST: &[AllowlistRule] = &[
    AllowlistRule::new("c10_experimental", "2222-01-01"),
    // Internal
    AllowlistRule::new("static", "9999-01-01"),
    AllowlistRule::new("prim::ModuleDictIndex", "9999-01-01"),
    AllowlistRule::new("prim::MKLDNNRelu6", "9999-01-01"),
    AllowlistRule::new("prim::MKLDNNRelu6_", "9999-01-01"),
    AllowlistRule::new("prim::Concat", "9999-01-01"),
    // Profiler
    AllowlistRule::new("profiler::_call_end_callbacks_on_jit_fut*", "9999-01-01"),
    AllowlistRule::new("profiler::_record_function_enter", "9999-01-01"),
    AllowlistRule::new("aten::linalg_matrix_rank", "2021-10-30"),
    AllowlistRule::new("aten::linalg_pinv", "2021-10-30"),
    AllowlistRule::new("aten::_cholesky_helper", "9999-01-01"),
    AllowlistRule::new("aten::_lstsq_helper", "9999-01-01"),
    AllowlistRule::new("aten::_syevd_helper", "9999-01-01"),
    AllowlistRule::new("aten::_linalg_solve_out_helper_", "9999-01-01"),
    AllowlistRule::new("aten::select_backward", "9999-01-01"),
    AllowlistRule::new("aten::slice_backward", "9999-01-01"),
    AllowlistRule::new("aten::diagonal_backward", "9999-01-01"),
    AllowlistRule::new("aten::rowwise_prune", "9999-01-01"),
    AllowlistRule::new("aten::adaptive_avg_pool3d_backward", "9999-01-01"),
    AllowlistRule::new("aten::_embedding_bag_dense_backward", "9999-01-01"),
    AllowlistRule::new("aten::randperm", "9999-01-01"),
    AllowlistRule::new("aten::gelu", "2022-03-01"),
    AllowlistRule::new("aten::gelu_backward", "2022-03-01"),
    AllowlistRule::new("aten::cudnn_convolution_backward", "2022-01-31"),
    AllowlistRule::new("aten::cudnn_convolution_backward_input", "2022-01-31"),
    AllowlistRule::new("aten::cudnn_convolution_backward_weight", "2022-01-31"),
    AllowlistRule::new("aten::cudnn_convolution_transpose_backward", "2022-01-31"),
    AllowlistRule::new("aten::cudnn_convolution_transpose_backward_input", "2022-01-31"),
    AllowlistRule::new("aten::cudnn_convolution_transpose_backward_weight", "2022-01-31"),
    AllowlistRule::new("aten::mkldnn_convolution_backward", "2022-01-31"),
    AllowlistRule::new("aten::mkldnn_convolution_backward_input", "2022-01-31"),
    AllowlistRule::new("aten::mkldnn_convolution_backward_weights", "2022-01-31"),
    AllowlistRule::new("aten::_nnpack_spatial_convolution_backward", "2022-01-31"),
    AllowlistRule::new("aten::_nnpack_spatial_convolution_backward_input", "2022-01-31"),
    AllowlistRule::new("aten::_nnpack_spatial_convolution_backward_weight", "2022-01-31"),
    AllowlistRule::new("aten::_slow_conv2d_forward", "2022-01-31"),
    AllowlistRule::new("aten::_slow_conv2d_backward", "2022-01-31"),
    AllowlistRule::new("aten::slow_conv3d_forward", "2022-01-31"),
    AllowlistRule::new("aten::slow_conv3d_backward", "2022-01-31"),
    AllowlistRule::new("aten::slow_conv_dilated2d_backward", "2022-01-31"),
    AllowlistRule::new("aten::slow_conv_dilated3d_backward", "2022-01-31"),
    AllowlistRule::new("aten::slow_conv_transpose2d", "2022-01-31"),
    AllowlistRule::new("aten::slow_conv_transpose2d_backward", "2022-01-31"),
    AllowlistRule::new("aten::slow_conv_transpose3d", "2022-01-31"),
    AllowlistRule::new("aten::slow_conv_transpose3d_backward", "2022-01-31"),
    AllowlistRule::new("aten::_index_copy_", "2022-05-31"),
    AllowlistRule::new("aten::_svd_helper", "2022-03-31"),
    AllowlistRule::new("aten::linalg_svdvals", "2022-03-31"),
    AllowlistRule::new("aten::linalg_svdvals_out", "2022-03-31"),
    AllowlistRule::new("aten::linalg_svd", "2022-03-31"),
    AllowlistRule::new("aten::linalg_svd_out", "2022-03-31"),
    AllowlistRule::new("aten::_max_pool1d_cpu_forward", "2022-02-08"),
    AllowlistRule::new("aten::_convolution_nogroup", "9999-01-01"),
    AllowlistRule::new("aten::miopen_convolution_backward", "9999-01-01"),
    AllowlistRule::new("aten::miopen_convolution_backward_bias", "9999-01-01"),
    AllowlistRule::new("aten::miopen_convolution_backward_input", "9999-01-01"),
    AllowlistRule::new("aten::miopen_convolution_backward_weight", "9999-01-01"),
    AllowlistRule::new("aten::miopen_convolution_transpose_backward", "9999-01-01"),
    AllowlistRule::new("aten::miopen_convolution_transpose_backward_input", "9999-01-01"),
    AllowlistRule::new("aten::miopen_convolution_transpose_backward_weight", "9999-01-01"),
    AllowlistRule::new("aten::miopen_depthwise_convolution_backward", "9999-01-01"),
    AllowlistRule::new("aten::miopen_depthwise_convolution_backward_input", "9999-01-01"),
    AllowlistRule::new("aten::miopen_depthwise_convolution_backward_weight", "9999-01-01"),
    AllowlistRule::new("caffe2::", "2021-10-23"),
    AllowlistRule::new("prepacked::unpack_prepacked_sizes_conv2d", "9999-01-01"),
    AllowlistRule::new("prepacked::unpack_prepacked_sizes_linear", "9999-01-01"),
    AllowlistRule::new("q::_FloatToBfloat16Quantized", "2021-12-21"),
    AllowlistRule::new("q::_Bfloat16QuantizedToFloat", "2021-12-21"),
    AllowlistRule::new("aten::_inverse_helper", "2021-12-31"),
    AllowlistRule::new("aten::softplus_backward", "2022-01-31"),
    AllowlistRule::new("aten::softplus_backward.grad_input", "2022-01-31"),
    AllowlistRule::new("aten::quantile", "2022-09-30"),
    AllowlistRule::new("aten::nanquantile", "2022-09-30"),
    AllowlistRule::new("aten::_convolution_double_backward", "2022-03-31"),
    AllowlistRule::new("aten::_scatter_reduce", "2022-01-31"),
    AllowlistRule::new("aten::scatter_reduce.two", "2022-03-15"),
    AllowlistRule::new("aten::native_multi_head_self_attention", "9999-01-01"),
    AllowlistRule::new("aten::_native_multi_head_self_attention", "9999-01-01"),
    AllowlistRule::new("aten::_transform_bias_rescale_qkv", "9999-01-01"),
];

// Newly added schema syntax that older snapshot parsers reject
pub const DEFAULT_DONT_PARSE: &[DontParseRule] = &[
    DontParseRule::new("_TorchScriptTesting.*", "2099-09-17"),
    DontParseRule::new("test_backend", "2099-09-17"),
    DontParseRule::new("dist_c10d", "2099-09-17"),
];

fn parse_expiry(pattern: &str, expires: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(expires, "%Y-%m-%d").map_err(|_| SchemaError::InvalidDate {
        pattern: pattern.to_string(),
        date: expires.to_string(),
    })
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// An active (non-expired) allowlist entry
#[derive(Debug, Clone)]
pub struct AllowlistEntry {
    pub name_pattern: Regex,
    pub expires: NaiveDate,
    pub arg_pattern: Option<Regex>,
}

/// Allowlist compiled against a fixed "today"
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    entries: Vec<AllowlistEntry>,
}

impl Allowlist {
    /// Compile `rules`, keeping only entries that expire on or after `today`
    ///
    /// Every rule is validated, including expired ones.
    pub fn compile(rules: &[AllowlistRule], today: NaiveDate) -> Result<Self> {
        let mut entries = Vec::new();
        for rule in rules {
            let expires = parse_expiry(rule.name, rule.expires)?;
            let name_pattern = compile(rule.name)?;
            let arg_pattern = rule.args.map(compile).transpose()?;
            if expires < today {
                debug!(pattern = rule.name, %expires, "allowlist entry expired");
                continue;
            }
            entries.push(AllowlistEntry {
                name_pattern,
                expires,
                arg_pattern,
            });
        }
        Ok(Self { entries })
    }

    /// The built-in allowlist
    pub fn builtin(today: NaiveDate) -> Result<Self> {
        Self::compile(DEFAULT_ALLOWLIST, today)
    }

    /// Active entries, in declaration order
    pub fn entries(&self) -> &[AllowlistEntry] {
        &self.entries
    }

    /// First entry whose name pattern matches decides; an argument pattern narrows it
    pub fn is_allowed(&self, schema: &Schema) -> bool {
        let rendered = schema.to_string();
        self.entries
            .iter()
            .find(|entry| entry.name_pattern.is_match(&rendered))
            .is_some_and(|entry| {
                entry
                    .arg_pattern
                    .as_ref()
                    .map_or(true, |args| args.is_match(&rendered))
            })
    }
}

/// An active don't-parse entry
#[derive(Debug, Clone)]
pub struct DontParseEntry {
    pub pattern: Regex,
    pub expires: NaiveDate,
}

/// Don't-parse list compiled against a fixed "today"
#[derive(Debug, Clone, Default)]
pub struct DontParseList {
    entries: Vec<DontParseEntry>,
}

impl DontParseList {
    pub fn compile(rules: &[DontParseRule], today: NaiveDate) -> Result<Self> {
        let mut entries = Vec::new();
        for rule in rules {
            let expires = parse_expiry(rule.pattern, rule.expires)?;
            let pattern = compile(rule.pattern)?;
            if expires < today {
                debug!(pattern = rule.pattern, %expires, "don't-parse entry expired");
                continue;
            }
            entries.push(DontParseEntry { pattern, expires });
        }
        Ok(Self { entries })
    }

    /// The built-in don't-parse list
    pub fn builtin(today: NaiveDate) -> Result<Self> {
        Self::compile(DEFAULT_DONT_PARSE, today)
    }

    /// Whether a raw snapshot line should be skipped before parsing
    pub fn should_skip(&self, line: &str) -> bool {
        self.entries.iter().any(|entry| entry.pattern.is_match(line))
    }
}
