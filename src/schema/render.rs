//! Canonical textual form of schemas
//!
//! Allowlist and don't-parse patterns are authored against this form, so
//! it must stay stable: `name.overload(args) -> returns`.

use std::fmt::{self, Write};

use super::{AliasInfo, Argument, DefaultValue, Schema, TypeKind};

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.overload_name.is_empty() {
            write!(f, ".{}", self.overload_name)?;
        }

        f.write_char('(')?;
        let mut seen_kwarg_only = false;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if arg.kwarg_only && !seen_kwarg_only {
                f.write_str("*, ")?;
                seen_kwarg_only = true;
            }
            write!(f, "{}", arg)?;
        }
        if self.is_vararg {
            if !self.arguments.is_empty() {
                f.write_str(", ")?;
            }
            f.write_str("...")?;
        }
        f.write_str(") -> ")?;

        if self.is_varret {
            return f.write_str("...");
        }
        match self.returns.as_slice() {
            [single] if single.name.is_empty() => {
                let ty = render_type(&single.ty, single.alias_info.as_ref(), single.fixed_len);
                // A bare tuple-typed return would read as a returns list.
                if ty.starts_with('(') {
                    write!(f, "({})", ty)
                } else {
                    f.write_str(&ty)
                }
            }
            returns => {
                f.write_char('(')?;
                for (i, ret) in returns.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_return(f, ret)?;
                }
                f.write_char(')')
            }
        }
    }
}

fn write_return(f: &mut fmt::Formatter<'_>, ret: &Argument) -> fmt::Result {
    f.write_str(&render_type(&ret.ty, ret.alias_info.as_ref(), ret.fixed_len))?;
    if !ret.name.is_empty() {
        write!(f, " {}", ret.name)?;
    }
    Ok(())
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            render_type(&self.ty, self.alias_info.as_ref(), self.fixed_len),
            self.name
        )?;
        match (&self.default, self.fixed_len) {
            (Some(default), Some(n)) => match uniform_int_list(default, n) {
                Some(item) => write!(f, "={}", item)?,
                None => write!(f, "={}", default)?,
            },
            (Some(default), None) => write!(f, "={}", default)?,
            (None, _) => {}
        }
        Ok(())
    }
}

/// `int[2] stride=[1, 1]` is written `int[2] stride=1`
fn uniform_int_list(default: &DefaultValue, n: usize) -> Option<&DefaultValue> {
    match default {
        DefaultValue::List(items) if items.len() == n && n > 1 => {
            let first = items.first()?;
            let uniform = matches!(first, DefaultValue::Int(_)) && items.iter().all(|i| i == first);
            uniform.then_some(first)
        }
        _ => None,
    }
}

/// Render a type with its alias annotation and fixed list length in place
fn render_type(ty: &TypeKind, alias: Option<&AliasInfo>, fixed_len: Option<usize>) -> String {
    match ty {
        TypeKind::Optional(inner) => format!("{}?", render_type(inner, alias, fixed_len)),
        TypeKind::List(elem) => {
            let elem_alias = alias.and_then(|a| a.contained.first());
            let mut out = render_type(elem, elem_alias, None);
            match fixed_len {
                Some(n) => out.push_str(&format!("[{}]", n)),
                None => out.push_str("[]"),
            }
            if let Some(own) = alias.filter(|a| a.has_sets()) {
                out.push_str(&format!("({})", own));
            }
            out
        }
        other => match alias {
            Some(a) => format!("{}({})", other, a),
            None => other.to_string(),
        },
    }
}

impl fmt::Display for AliasInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.before_sets.join("|"))?;
        if self.is_write {
            f.write_char('!')?;
        }
        if self.after_sets != self.before_sets {
            write!(f, " -> {}", self.after_sets.join("|"))?;
        }
        Ok(())
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::None => f.write_str("None"),
            DefaultValue::Bool(true) => f.write_str("True"),
            DefaultValue::Bool(false) => f.write_str("False"),
            DefaultValue::Int(v) => write!(f, "{}", v),
            DefaultValue::Float(v) => write_float(f, *v),
            DefaultValue::Str(s) => {
                f.write_char('"')?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        c => f.write_char(c)?,
                    }
                }
                f.write_char('"')
            }
            DefaultValue::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_char(']')
            }
            DefaultValue::Ident(ident) => f.write_str(ident),
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        return f.write_str("nan");
    }
    if v.is_infinite() {
        return f.write_str(if v > 0.0 { "inf" } else { "-inf" });
    }
    let magnitude = v.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        // C-style exponent (`1e-05`, `1e+20`) so the text never reads as an int
        let sci = format!("{:e}", v);
        let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
        let exponent: i32 = exponent.parse().map_err(|_| fmt::Error)?;
        let sign = if exponent < 0 { '-' } else { '+' };
        write!(f, "{}e{}{:02}", mantissa, sign, exponent.abs())
    } else if v.fract() == 0.0 {
        write!(f, "{:.1}", v)
    } else {
        write!(f, "{}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) {
        let schema = Schema::parse(text).unwrap();
        let rendered = schema.to_string();
        assert_eq!(rendered, text);
        assert_eq!(Schema::parse(&rendered).unwrap(), schema);
    }

    #[test]
    fn test_render_is_canonical() {
        round_trip("foo(Tensor a, int b) -> Tensor");
        round_trip("aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor");
        round_trip(
            "aten::add_.Tensor(Tensor(a!) self, Tensor other, *, Scalar alpha=1) -> Tensor(a!)",
        );
        round_trip("aten::split(Tensor(a -> *) self, int split_size, int dim=0) -> Tensor(a)[]");
        round_trip(
            "aten::max.dim(Tensor self, int dim, bool keepdim=False) -> (Tensor values, Tensor indices)",
        );
        round_trip(
            "aten::conv2d(Tensor input, Tensor weight, Tensor? bias=None, int[2] stride=1) -> Tensor",
        );
        round_trip(
            "aten::conv2d(Tensor input, int[2] stride=[1, 2], int[1] dilation=[1]) -> Tensor",
        );
        round_trip("aten::mean(Tensor self, *, ScalarType? dtype=None) -> Tensor");
        round_trip("aten::layer_norm(Tensor input, float eps=1.0, str mode=\"mean\") -> Tensor");
        round_trip("prim::Print(...) -> ()");
        round_trip("prim::TupleUnpack(Any tup) -> ...");
        round_trip("aten::dict(Dict(str, Tensor) self) -> ((str, Tensor)[])");
    }

    #[test]
    fn test_render_floats() {
        assert_eq!(DefaultValue::Float(1.0).to_string(), "1.0");
        assert_eq!(DefaultValue::Float(0.5).to_string(), "0.5");
        assert_eq!(DefaultValue::Float(f64::NEG_INFINITY).to_string(), "-inf");
    }

    #[test]
    fn test_render_large_and_small_floats() {
        assert_eq!(DefaultValue::Float(1e-5).to_string(), "1e-05");
        assert_eq!(DefaultValue::Float(1e20).to_string(), "1e+20");
        assert_eq!(DefaultValue::Float(1e15).to_string(), "1000000000000000.0");
        assert_eq!(DefaultValue::Float(-2.5e-7).to_string(), "-2.5e-07");

        round_trip("foo(float eps=1e-05) -> Tensor");
        round_trip("foo(float x=1e+20) -> Tensor");
        round_trip("foo(Scalar x=1e+20) -> Tensor");
        for text in [
            "foo(Scalar x=1e15) -> Tensor",
            "foo(float x=1e20) -> Tensor",
            "foo(float x=1.5e300) -> Tensor",
        ] {
            let schema = Schema::parse(text).unwrap();
            assert_eq!(Schema::parse(&schema.to_string()).unwrap(), schema, "{}", text);
        }
    }

    #[test]
    fn test_uniform_fixed_list_default_collapses() {
        let s = Schema::parse(
            "foo(int[3] size=[2, 2, 2], SymInt[2] pad=[0, 1]) -> Tensor",
        )
        .unwrap();
        assert_eq!(s.to_string(), "foo(int[3] size=2, SymInt[2] pad=[0, 1]) -> Tensor");
        assert_eq!(Schema::parse(&s.to_string()).unwrap(), s);
    }
}
