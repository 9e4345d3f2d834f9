// Line-oriented driver for the vector engine
//
// One statement per line; `#` starts a comment. Vector instructions use
// assembler syntax with scalar operands written as literals and scalar
// destinations omitted (the result is printed and kept for `expect x`):
//
//   vsetvli 8, e32, m2, ta, mu
//   mem e32 0x1000 1 2 3 4 5 6 7 8
//   fault 0x1010 0x1014
//   vle32ff.v v4, (0x1000)
//   vadd.vi v8, v4, -1, v0.t
//   vcpop.m v0
//   expect vl = 4
//   expect v8 = 0 1 2 3
//
// Directives: vsetvli, vsetvl, csrw, mem, fault, clear-faults, dump, peek,
// expect. A trap does not stop the script; it is reported and remembered
// for `expect trap = <cause>`.

use std::io::Write;

use crate::config::NUM_VREGS;
use crate::memory::{MemoryFault, Ram};
use crate::vector::arith::CarryOp;
use crate::vector::mask::{MaskLogicOp, SetFirst};
use crate::vector::mem::MemOp;
use crate::vector::reduction::{ReductionOp, WideningReduction};
use crate::vector::{
    BinaryOp, CompareOp, Lmul, MulAddOp, NarrowingOp, Operand, Progress, Sew, Trap, VectorUnit, Vtype, Vxrm,
    WideningOp,
};

/// Failure of one script line
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct ScriptError {
    pub line: usize,
    pub kind: LineError,
}

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("{0}")]
    Syntax(String),
    #[error("expected {expected}, found {found}")]
    Expectation { expected: String, found: String },
    #[error(transparent)]
    Memory(#[from] MemoryFault),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn syntax(msg: impl Into<String>) -> LineError {
    LineError::Syntax(msg.into())
}

// ============================================================================
// Token parsing
// ============================================================================

/// Decimal, `0x` hex or `0b` binary; a leading `-` gives two's complement
fn parse_int(tok: &str) -> Result<u64, LineError> {
    let tok = tok.trim();
    let (neg, body) = match tok.strip_prefix('-') {
        Some(body) => (true, body),
        None => (false, tok),
    };
    let body = body.replace('_', "");
    let parsed = if let Some(hex) = body.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else if let Some(bin) = body.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else {
        body.parse::<u64>()
    };
    let val = parsed.map_err(|_| syntax(format!("bad number `{tok}`")))?;
    Ok(if neg { val.wrapping_neg() } else { val })
}

fn parse_vreg(tok: &str) -> Result<usize, LineError> {
    tok.strip_prefix('v')
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|&n| n < NUM_VREGS)
        .ok_or_else(|| syntax(format!("bad vector register `{tok}`")))
}

fn parse_sew(tok: &str) -> Result<Sew, LineError> {
    tok.strip_prefix('e')
        .and_then(|n| n.parse::<u32>().ok())
        .and_then(Sew::from_bits)
        .ok_or_else(|| syntax(format!("bad element width `{tok}`")))
}

fn parse_lmul(tok: &str) -> Result<Lmul, LineError> {
    let lmul = match tok {
        "mf8" => Lmul::Mf8,
        "mf4" => Lmul::Mf4,
        "mf2" => Lmul::Mf2,
        "m1" => Lmul::M1,
        "m2" => Lmul::M2,
        "m4" => Lmul::M4,
        "m8" => Lmul::M8,
        _ => return Err(syntax(format!("bad LMUL `{tok}`"))),
    };
    Ok(lmul)
}

/// `(addr)`
fn parse_addr(tok: &str) -> Result<u64, LineError> {
    let inner = tok
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| syntax(format!("expected (address), found `{tok}`")))?;
    parse_int(inner)
}

fn parse_vxrm(tok: &str) -> Result<Vxrm, LineError> {
    Ok(match tok {
        "rnu" => Vxrm::Rnu,
        "rne" => Vxrm::Rne,
        "rdn" => Vxrm::Rdn,
        "rod" => Vxrm::Rod,
        _ => Vxrm::from_bits(parse_int(tok)?),
    })
}

/// Second source of a `.vv` / `.vx` / `.vi` (or `.wv`, `.vvm`, ...) form
fn parse_operand(suffix: &str, tok: &str) -> Result<Operand, LineError> {
    match suffix.as_bytes().get(1) {
        Some(b'v') => Ok(Operand::Vector(parse_vreg(tok)?)),
        Some(b'x' | b'i') => Ok(Operand::Scalar(parse_int(tok)?)),
        _ => Err(syntax(format!("unexpected form `.{suffix}`"))),
    }
}

fn args<'a, const N: usize>(args: &[&'a str]) -> Result<[&'a str; N], LineError> {
    <[&str; N]>::try_from(args).map_err(|_| syntax(format!("expected {N} operands, found {}", args.len())))
}

// ============================================================================
// Mnemonic tables
// ============================================================================

fn binary_op(base: &str) -> Option<BinaryOp> {
    Some(match base {
        "vadd" => BinaryOp::Add,
        "vsub" => BinaryOp::Sub,
        "vrsub" => BinaryOp::Rsub,
        "vand" => BinaryOp::And,
        "vor" => BinaryOp::Or,
        "vxor" => BinaryOp::Xor,
        "vsll" => BinaryOp::Sll,
        "vsrl" => BinaryOp::Srl,
        "vsra" => BinaryOp::Sra,
        "vminu" => BinaryOp::Minu,
        "vmin" => BinaryOp::Min,
        "vmaxu" => BinaryOp::Maxu,
        "vmax" => BinaryOp::Max,
        "vmul" => BinaryOp::Mul,
        "vmulh" => BinaryOp::Mulh,
        "vmulhu" => BinaryOp::Mulhu,
        "vmulhsu" => BinaryOp::Mulhsu,
        "vdivu" => BinaryOp::Divu,
        "vdiv" => BinaryOp::Div,
        "vremu" => BinaryOp::Remu,
        "vrem" => BinaryOp::Rem,
        "vsaddu" => BinaryOp::Saddu,
        "vsadd" => BinaryOp::Sadd,
        "vssubu" => BinaryOp::Ssubu,
        "vssub" => BinaryOp::Ssub,
        "vaaddu" => BinaryOp::Aaddu,
        "vaadd" => BinaryOp::Aadd,
        "vasubu" => BinaryOp::Asubu,
        "vasub" => BinaryOp::Asub,
        "vsmul" => BinaryOp::Smul,
        "vssrl" => BinaryOp::Ssrl,
        "vssra" => BinaryOp::Ssra,
        _ => return None,
    })
}

fn mul_add_op(base: &str) -> Option<MulAddOp> {
    Some(match base {
        "vmacc" => MulAddOp::Macc,
        "vnmsac" => MulAddOp::Nmsac,
        "vmadd" => MulAddOp::Madd,
        "vnmsub" => MulAddOp::Nmsub,
        _ => return None,
    })
}

fn widening_op(base: &str, wide_src: bool) -> Option<WideningOp> {
    Some(match (base, wide_src) {
        ("vwaddu", false) => WideningOp::Addu,
        ("vwadd", false) => WideningOp::Add,
        ("vwsubu", false) => WideningOp::Subu,
        ("vwsub", false) => WideningOp::Sub,
        ("vwaddu", true) => WideningOp::AdduW,
        ("vwadd", true) => WideningOp::AddW,
        ("vwsubu", true) => WideningOp::SubuW,
        ("vwsub", true) => WideningOp::SubW,
        ("vwmulu", false) => WideningOp::Mulu,
        ("vwmul", false) => WideningOp::Mul,
        ("vwmulsu", false) => WideningOp::Mulsu,
        ("vwmaccu", false) => WideningOp::Maccu,
        ("vwmacc", false) => WideningOp::Macc,
        ("vwmaccsu", false) => WideningOp::Maccsu,
        ("vwmaccus", false) => WideningOp::Maccus,
        _ => return None,
    })
}

fn narrowing_op(base: &str) -> Option<NarrowingOp> {
    Some(match base {
        "vnsrl" => NarrowingOp::Srl,
        "vnsra" => NarrowingOp::Sra,
        "vnclipu" => NarrowingOp::Clipu,
        "vnclip" => NarrowingOp::Clip,
        _ => return None,
    })
}

fn compare_op(base: &str) -> Option<CompareOp> {
    Some(match base {
        "vmseq" => CompareOp::Eq,
        "vmsne" => CompareOp::Ne,
        "vmsltu" => CompareOp::Ltu,
        "vmslt" => CompareOp::Lt,
        "vmsleu" => CompareOp::Leu,
        "vmsle" => CompareOp::Le,
        "vmsgtu" => CompareOp::Gtu,
        "vmsgt" => CompareOp::Gt,
        _ => return None,
    })
}

fn mask_logic_op(base: &str) -> Option<MaskLogicOp> {
    Some(match base {
        "vmand" => MaskLogicOp::And,
        "vmnand" => MaskLogicOp::Nand,
        "vmandn" => MaskLogicOp::AndNot,
        "vmxor" => MaskLogicOp::Xor,
        "vmor" => MaskLogicOp::Or,
        "vmnor" => MaskLogicOp::Nor,
        "vmorn" => MaskLogicOp::OrNot,
        "vmxnor" => MaskLogicOp::Xnor,
        _ => return None,
    })
}

fn reduction_op(base: &str) -> Option<ReductionOp> {
    Some(match base {
        "vredsum" => ReductionOp::Sum,
        "vredand" => ReductionOp::And,
        "vredor" => ReductionOp::Or,
        "vredxor" => ReductionOp::Xor,
        "vredminu" => ReductionOp::Minu,
        "vredmin" => ReductionOp::Min,
        "vredmaxu" => ReductionOp::Maxu,
        "vredmax" => ReductionOp::Max,
        _ => return None,
    })
}

/// Decoded load/store mnemonic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemForm {
    Unit { eew: Sew, fields: usize, ff: bool },
    Strided { eew: Sew, fields: usize },
    Indexed { eew: Sew, fields: usize, ordered: bool },
    Whole { nr: usize },
    Mask,
}

/// `vle32`, `vlseg3e8ff`, `vsse16`, `vloxseg2ei32`, `vl2re64`, `vs4r`, `vlm`, ...
/// Returns `(is_store, form)`.
fn mem_form(base: &str) -> Option<(bool, MemForm)> {
    let (store, rest) = match base.strip_prefix("vl") {
        Some(rest) => (false, rest),
        None => (true, base.strip_prefix("vs")?),
    };
    if rest == "m" {
        return Some((store, MemForm::Mask));
    }
    if rest.starts_with(|c: char| c.is_ascii_digit()) {
        let end = rest.find(|c: char| !c.is_ascii_digit())?;
        let nr = rest[..end].parse().ok()?;
        let tail = &rest[end..];
        let valid = if store {
            tail == "r"
        } else {
            tail.strip_prefix("re")
                .and_then(|bits| bits.parse().ok())
                .and_then(Sew::from_bits)
                .is_some()
        };
        return valid.then_some((store, MemForm::Whole { nr }));
    }

    #[derive(PartialEq)]
    enum Mode {
        Unit,
        Strided,
        Indexed(bool),
    }
    let (mode, rest) = if let Some(r) = rest.strip_prefix("ux") {
        (Mode::Indexed(false), r)
    } else if let Some(r) = rest.strip_prefix("ox") {
        (Mode::Indexed(true), r)
    } else if rest.starts_with("sseg") || (rest.starts_with("se") && !rest.starts_with("seg")) {
        (Mode::Strided, &rest[1..])
    } else {
        (Mode::Unit, rest)
    };
    let (fields, rest) = match rest.strip_prefix("seg") {
        Some(r) => {
            let end = r.find(|c: char| !c.is_ascii_digit())?;
            (r[..end].parse().ok()?, &r[end..])
        }
        None => (1, rest),
    };
    let (ff, rest) = match rest.strip_suffix("ff") {
        Some(r) => (true, r),
        None => (false, rest),
    };
    let bits = match mode {
        Mode::Indexed(_) => rest.strip_prefix("ei")?,
        _ => rest.strip_prefix('e')?,
    };
    let eew = Sew::from_bits(bits.parse().ok()?)?;
    if ff && (store || mode != Mode::Unit) {
        return None;
    }
    let form = match mode {
        Mode::Unit => MemForm::Unit { eew, fields, ff },
        Mode::Strided => MemForm::Strided { eew, fields },
        Mode::Indexed(ordered) => MemForm::Indexed {
            eew,
            fields,
            ordered,
        },
    };
    Some((store, form))
}

// ============================================================================
// Session
// ============================================================================

/// Engine, backing memory and the script's observable state
pub struct Session<W: Write> {
    pub unit: VectorUnit,
    pub ram: Ram,
    out: W,
    scalar: Option<u64>,
    last_trap: Option<Trap>,
}

impl<W: Write> Session<W> {
    pub fn new(unit: VectorUnit, ram: Ram, out: W) -> Self {
        Self {
            unit,
            ram,
            out,
            scalar: None,
            last_trap: None,
        }
    }

    /// Result of the most recent scalar-producing instruction
    pub fn scalar(&self) -> Option<u64> {
        self.scalar
    }

    /// Trap raised by the most recent vector instruction, if any
    pub fn last_trap(&self) -> Option<Trap> {
        self.last_trap
    }

    pub fn run(&mut self, source: &str) -> Result<(), ScriptError> {
        for (idx, raw) in source.lines().enumerate() {
            let text = raw.split('#').next().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }
            log::trace!("script {}: {text}", idx + 1);
            self.exec(text).map_err(|kind| ScriptError { line: idx + 1, kind })?;
        }
        Ok(())
    }

    /// Execute one statement
    pub fn exec(&mut self, text: &str) -> Result<(), LineError> {
        let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let mut ops: Vec<&str> = rest.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        match head {
            "vsetvli" => self.vsetvli(&ops),
            "vsetvl" => {
                let [avl, raw] = args(&ops)?;
                let vl = self.unit.vsetvl(parse_int(avl)?, parse_int(raw)?);
                writeln!(self.out, "vl = {vl}")?;
                Ok(())
            }
            "csrw" => self.csrw(&ops),
            "mem" => self.poke(rest),
            "peek" => self.peek(rest),
            "fault" => {
                let words: Vec<&str> = rest.split_whitespace().collect();
                let [start, end] = args(&words)?;
                self.ram.inject_fault(parse_int(start)?..parse_int(end)?);
                Ok(())
            }
            "clear-faults" => {
                self.ram.clear_faults();
                Ok(())
            }
            "dump" => self.dump(rest),
            "expect" => self.expect(rest),
            _ => {
                let masked = ops.last() == Some(&"v0.t");
                if masked {
                    ops.pop();
                }
                self.instruction(head, &ops, masked)
            }
        }
    }

    // ========================================================================
    // Directives
    // ========================================================================

    /// `vsetvli <avl|max>, e<sew>, m<lmul>[, ta|tu][, ma|mu]`
    fn vsetvli(&mut self, ops: &[&str]) -> Result<(), LineError> {
        if ops.len() < 3 {
            return Err(syntax("usage: vsetvli <avl|max>, e<sew>, m<lmul>[, ta|tu][, ma|mu]"));
        }
        let avl = match ops[0] {
            "max" => u64::MAX,
            tok => parse_int(tok)?,
        };
        let mut vtype = Vtype::new(parse_sew(ops[1])?, parse_lmul(ops[2])?);
        for flag in &ops[3..] {
            match *flag {
                "ta" => vtype.vta = true,
                "tu" => vtype.vta = false,
                "ma" => vtype.vma = true,
                "mu" => vtype.vma = false,
                other => return Err(syntax(format!("bad policy `{other}`"))),
            }
        }
        if vtype.vill {
            log::warn!("vsetvli: {},{} is not a supported configuration", ops[1], ops[2]);
        }
        let vl = self.unit.configure(avl, vtype);
        writeln!(self.out, "vl = {vl}")?;
        Ok(())
    }

    /// `csrw vxrm|vxsat|vstart, <value>`
    fn csrw(&mut self, ops: &[&str]) -> Result<(), LineError> {
        let [csr, val] = args(ops)?;
        match csr {
            "vxrm" => self.unit.csrs.vxrm = parse_vxrm(val)?,
            "vxsat" => self.unit.csrs.vxsat = parse_int(val)? & 1 != 0,
            "vstart" => {
                let vstart = parse_int(val)?;
                if vstart > self.unit.vl() as u64 {
                    return Err(syntax(format!("vstart {vstart} exceeds vl {}", self.unit.vl())));
                }
                self.unit.csrs.vstart = vstart as usize;
            }
            other => return Err(syntax(format!("unknown CSR `{other}`"))),
        }
        Ok(())
    }

    /// `mem e<w> <addr> <v0> <v1> ...`: raw little-endian write
    fn poke(&mut self, rest: &str) -> Result<(), LineError> {
        let words: Vec<&str> = rest.split_whitespace().collect();
        if words.len() < 3 {
            return Err(syntax("usage: mem e<w> <addr> <values...>"));
        }
        let width = parse_sew(words[0])?;
        let addr = parse_int(words[1])?;
        let mut bytes = Vec::with_capacity((words.len() - 2) * width.bytes());
        for word in &words[2..] {
            bytes.extend_from_slice(&parse_int(word)?.to_le_bytes()[..width.bytes()]);
        }
        self.ram.load_bytes(addr, &bytes)?;
        Ok(())
    }

    fn read_mem(&self, width: Sew, addr: u64, count: usize) -> Result<Vec<u64>, LineError> {
        let len = count
            .checked_mul(width.bytes())
            .ok_or_else(|| syntax(format!("{count} {width} elements is too large")))?;
        let bytes = self.ram.bytes(addr, len)?;
        Ok(bytes
            .chunks(width.bytes())
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf[..chunk.len()].copy_from_slice(chunk);
                u64::from_le_bytes(buf)
            })
            .collect())
    }

    /// `peek e<w> <addr> <count>`
    fn peek(&mut self, rest: &str) -> Result<(), LineError> {
        let words: Vec<&str> = rest.split_whitespace().collect();
        let [width, addr, count] = args(&words)?;
        let (width, addr) = (parse_sew(width)?, parse_int(addr)?);
        let vals = self.read_mem(width, addr, parse_int(count)? as usize)?;
        writeln!(self.out, "mem[{addr:#x}].{width}: {}", hex_list(&vals))?;
        Ok(())
    }

    /// Width and element count of a register view: explicit or current
    /// SEW, and `vl` elements by default
    fn reg_view(&self, words: &[&str]) -> Result<(Sew, Option<usize>), LineError> {
        let default_sew = if self.unit.vtype().vill {
            Sew::E8
        } else {
            self.unit.vtype().sew
        };
        match words {
            [] => Ok((default_sew, None)),
            [w] if w.starts_with('e') => Ok((parse_sew(w)?, None)),
            [n] => Ok((default_sew, Some(parse_int(n)? as usize))),
            [w, n] => Ok((parse_sew(w)?, Some(parse_int(n)? as usize))),
            _ => Err(syntax("expected [e<w>] [count]")),
        }
    }

    fn read_reg(&self, reg: usize, sew: Sew, count: usize) -> Result<Vec<u64>, LineError> {
        let capacity = (NUM_VREGS - reg) * self.unit.vregs.vlenb() / sew.bytes();
        if count > capacity {
            return Err(syntax(format!("{count} {sew} elements overrun the register file from v{reg}")));
        }
        Ok((0..count).map(|i| self.unit.vregs.read_elem(reg, sew, i)).collect())
    }

    /// `dump v<n> [e<w>] [count]`
    fn dump(&mut self, rest: &str) -> Result<(), LineError> {
        let words: Vec<&str> = rest.split_whitespace().collect();
        let (reg, view) = words
            .split_first()
            .ok_or_else(|| syntax("usage: dump v<n> [e<w>] [count]"))?;
        let reg = parse_vreg(reg)?;
        let (sew, count) = self.reg_view(view)?;
        let vals = self.read_reg(reg, sew, count.unwrap_or(self.unit.vl()))?;
        writeln!(self.out, "v{reg}.{sew}: {}", hex_list(&vals))?;
        Ok(())
    }

    /// `expect <target> = <values>` where target is `v<n> [e<w>]`, `vl`,
    /// `vstart`, `vxsat`, `x`, `trap` or `mem e<w> <addr>`
    fn expect(&mut self, rest: &str) -> Result<(), LineError> {
        let (target, want) = rest
            .split_once('=')
            .ok_or_else(|| syntax("usage: expect <target> = <values>"))?;
        let target: Vec<&str> = target.split_whitespace().collect();
        let want: Vec<&str> = want.split_whitespace().collect();
        // Values compare at the width they were read with, so `-1` matches
        // an all-ones element
        let (found, width) = match target.as_slice() {
            ["vl"] => (vec![self.unit.vl() as u64], Sew::E64),
            ["vstart"] => (vec![self.unit.vstart() as u64], Sew::E64),
            ["vxsat"] => (vec![self.unit.csrs.vxsat as u64], Sew::E64),
            ["x"] => (
                vec![self.scalar.ok_or_else(|| syntax("no scalar result yet"))?],
                Sew::E64,
            ),
            ["trap"] => {
                let found = self.last_trap.map_or("none".to_string(), |t| t.cause().to_string());
                let expected = want.join(" ");
                if found != expected {
                    return Err(LineError::Expectation { expected, found });
                }
                return Ok(());
            }
            ["mem", width, addr] => {
                let width = parse_sew(width)?;
                (self.read_mem(width, parse_int(addr)?, want.len())?, width)
            }
            [reg, view @ ..] if reg.starts_with('v') => {
                let reg = parse_vreg(reg)?;
                let (sew, _) = self.reg_view(view)?;
                (self.read_reg(reg, sew, want.len())?, sew)
            }
            _ => return Err(syntax(format!("unknown expectation target `{}`", target.join(" ")))),
        };
        let expected = want.iter().map(|w| parse_int(w)).collect::<Result<Vec<_>, _>>()?;
        let matches = found.len() == expected.len()
            && found
                .iter()
                .zip(&expected)
                .all(|(&f, &e)| width.trunc(f) == width.trunc(e));
        if !matches {
            return Err(LineError::Expectation {
                expected: hex_list(&expected),
                found: hex_list(&found),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    fn report(&mut self, result: Result<Progress, Trap>) -> Result<(), LineError> {
        match result {
            Ok(Progress::Complete) => {}
            Ok(Progress::Truncated { vl }) => writeln!(self.out, "vl truncated to {vl}")?,
            Err(trap) => self.trapped(trap)?,
        }
        Ok(())
    }

    fn trapped(&mut self, trap: Trap) -> Result<(), LineError> {
        log::warn!("trap: {trap}");
        writeln!(
            self.out,
            "trap: {trap} (cause={}, tval={:#x}, vstart={})",
            trap.cause(),
            trap.tval(),
            self.unit.vstart()
        )?;
        self.last_trap = Some(trap);
        Ok(())
    }

    fn scalar_result(&mut self, result: Result<u64, Trap>) -> Result<(), LineError> {
        match result {
            Ok(val) => {
                self.scalar = Some(val);
                writeln!(self.out, "x = {}", val as i64)?;
                Ok(())
            }
            Err(trap) => self.trapped(trap),
        }
    }

    fn instruction(&mut self, mnemonic: &str, ops: &[&str], masked: bool) -> Result<(), LineError> {
        let (base, suffix) = mnemonic
            .split_once('.')
            .ok_or_else(|| syntax(format!("unknown statement `{mnemonic}`")))?;
        self.last_trap = None;
        let unit = &mut self.unit;

        let result = if let Some(op) = binary_op(base) {
            let [vd, vs2, rhs] = args(ops)?;
            unit.binary(op, parse_vreg(vd)?, parse_vreg(vs2)?, parse_operand(suffix, rhs)?, masked)
        } else if let Some(op) = mul_add_op(base) {
            let [vd, vs1, vs2] = args(ops)?;
            unit.mul_add(op, parse_vreg(vd)?, parse_operand(suffix, vs1)?, parse_vreg(vs2)?, masked)
        } else if let Some(op) = widening_op(base, suffix.starts_with('w')) {
            let [vd, a, b] = args(ops)?;
            // vwmacc* take the multiplier first, like vmacc
            let (vs2, rhs) = if op.accumulates() { (b, a) } else { (a, b) };
            unit.widening(op, parse_vreg(vd)?, parse_vreg(vs2)?, parse_operand(suffix, rhs)?, masked)
        } else if let Some(op) = narrowing_op(base) {
            let [vd, vs2, rhs] = args(ops)?;
            unit.narrowing(op, parse_vreg(vd)?, parse_vreg(vs2)?, parse_operand(suffix, rhs)?, masked)
        } else if let Some(op) = compare_op(base) {
            let [vd, vs2, rhs] = args(ops)?;
            unit.compare(op, parse_vreg(vd)?, parse_vreg(vs2)?, parse_operand(suffix, rhs)?, masked)
        } else if let Some(op) = mask_logic_op(base) {
            let [vd, vs2, vs1] = args(ops)?;
            unit.mask_logical(op, parse_vreg(vd)?, parse_vreg(vs2)?, parse_vreg(vs1)?)
        } else if let Some(op) = reduction_op(base) {
            let [vd, vs2, vs1] = args(ops)?;
            unit.reduce(op, parse_vreg(vd)?, parse_vreg(vs2)?, parse_vreg(vs1)?, masked)
        } else {
            return self.other_instruction(base, suffix, ops, masked);
        };
        self.report(result)
    }

    fn other_instruction(&mut self, base: &str, suffix: &str, ops: &[&str], masked: bool) -> Result<(), LineError> {
        let unit = &mut self.unit;
        let result = match (base, suffix) {
            ("vwredsumu" | "vwredsum", "vs") => {
                let op = if base == "vwredsum" {
                    WideningReduction::Sum
                } else {
                    WideningReduction::Sumu
                };
                let [vd, vs2, vs1] = args(ops)?;
                unit.widening_reduce(op, parse_vreg(vd)?, parse_vreg(vs2)?, parse_vreg(vs1)?, masked)
            }
            ("vadc" | "vsbc", "vvm" | "vxm" | "vim") => {
                let op = if base == "vadc" { CarryOp::Adc } else { CarryOp::Sbc };
                let [vd, vs2, rhs, _v0] = args(ops)?;
                unit.add_with_carry(op, parse_vreg(vd)?, parse_vreg(vs2)?, parse_operand(suffix, rhs)?)
            }
            ("vmadc" | "vmsbc", _) => {
                let op = if base == "vmadc" { CarryOp::Adc } else { CarryOp::Sbc };
                let carry_in = suffix.ends_with('m');
                let (vd, vs2, rhs) = if carry_in {
                    let [vd, vs2, rhs, _v0] = args(ops)?;
                    (vd, vs2, rhs)
                } else {
                    let [vd, vs2, rhs] = args(ops)?;
                    (vd, vs2, rhs)
                };
                unit.carry_out(op, parse_vreg(vd)?, parse_vreg(vs2)?, parse_operand(suffix, rhs)?, carry_in)
            }
            ("vmerge", "vvm" | "vxm" | "vim") => {
                let [vd, vs2, rhs, _v0] = args(ops)?;
                unit.merge(parse_vreg(vd)?, parse_vreg(vs2)?, parse_operand(suffix, rhs)?)
            }
            ("vmv", "v.v" | "v.x" | "v.i") => {
                let [vd, src] = args(ops)?;
                unit.move_vector(parse_vreg(vd)?, parse_operand(&suffix[1..], src)?)
            }
            ("vmv", "x.s") => {
                let [vs2] = args(ops)?;
                let result = unit.move_to_scalar(parse_vreg(vs2)?);
                return self.scalar_result(result);
            }
            ("vmv", "s.x") => {
                let [vd, x] = args(ops)?;
                unit.move_from_scalar(parse_vreg(vd)?, parse_int(x)?)
            }
            ("vmv1r" | "vmv2r" | "vmv4r" | "vmv8r", "v") => {
                let nr = base[3..4].parse().map_err(|_| syntax("bad register count"))?;
                let [vd, vs2] = args(ops)?;
                unit.move_whole(parse_vreg(vd)?, parse_vreg(vs2)?, nr)
            }
            ("vcpop", "m") => {
                let [vs2] = args(ops)?;
                let result = unit.cpop(parse_vreg(vs2)?, masked);
                return self.scalar_result(result);
            }
            ("vfirst", "m") => {
                let [vs2] = args(ops)?;
                let result = unit.first(parse_vreg(vs2)?, masked).map(|i| i as u64);
                return self.scalar_result(result);
            }
            ("vmsbf" | "vmsif" | "vmsof", "m") => {
                let kind = match base {
                    "vmsbf" => SetFirst::Before,
                    "vmsif" => SetFirst::Including,
                    _ => SetFirst::Only,
                };
                let [vd, vs2] = args(ops)?;
                unit.set_first(kind, parse_vreg(vd)?, parse_vreg(vs2)?, masked)
            }
            ("viota", "m") => {
                let [vd, vs2] = args(ops)?;
                unit.iota(parse_vreg(vd)?, parse_vreg(vs2)?, masked)
            }
            ("vid", "v") => {
                let [vd] = args(ops)?;
                unit.vid(parse_vreg(vd)?, masked)
            }
            ("vzext" | "vsext", "vf2" | "vf4" | "vf8") => {
                let factor = suffix[2..].parse().map_err(|_| syntax("bad extension factor"))?;
                let [vd, vs2] = args(ops)?;
                unit.extend(parse_vreg(vd)?, parse_vreg(vs2)?, factor, base == "vsext", masked)
            }
            ("vrgather", "vv" | "vx" | "vi") => {
                let [vd, vs2, idx] = args(ops)?;
                unit.gather(parse_vreg(vd)?, parse_vreg(vs2)?, parse_operand(suffix, idx)?, masked)
            }
            ("vrgatherei16", "vv") => {
                let [vd, vs2, vs1] = args(ops)?;
                unit.gather_ei16(parse_vreg(vd)?, parse_vreg(vs2)?, parse_vreg(vs1)?, masked)
            }
            ("vslideup" | "vslidedown", "vx" | "vi") => {
                let [vd, vs2, amount] = args(ops)?;
                let (vd, vs2, amount) = (parse_vreg(vd)?, parse_vreg(vs2)?, parse_int(amount)?);
                if base == "vslideup" {
                    unit.slide_up(vd, vs2, amount, masked)
                } else {
                    unit.slide_down(vd, vs2, amount, masked)
                }
            }
            ("vslide1up" | "vslide1down", "vx") => {
                let [vd, vs2, x] = args(ops)?;
                let (vd, vs2, x) = (parse_vreg(vd)?, parse_vreg(vs2)?, parse_int(x)?);
                if base == "vslide1up" {
                    unit.slide1_up(vd, vs2, x, masked)
                } else {
                    unit.slide1_down(vd, vs2, x, masked)
                }
            }
            ("vcompress", "vm") => {
                let [vd, vs2, vs1] = args(ops)?;
                unit.compress(parse_vreg(vd)?, parse_vreg(vs2)?, parse_vreg(vs1)?)
            }
            (_, "v") => return self.memory_instruction(base, ops, masked),
            _ => return Err(syntax(format!("unknown instruction `{base}.{suffix}`"))),
        };
        self.report(result)
    }

    fn memory_instruction(&mut self, base: &str, ops: &[&str], masked: bool) -> Result<(), LineError> {
        let (store, form) = mem_form(base).ok_or_else(|| syntax(format!("unknown instruction `{base}.v`")))?;
        let (reg, addr, extra) = match ops {
            [reg, addr] => (parse_vreg(reg)?, parse_addr(addr)?, None),
            [reg, addr, extra] => (parse_vreg(reg)?, parse_addr(addr)?, Some(*extra)),
            _ => return Err(syntax("expected v<n>, (address)[, stride|index]")),
        };
        let needs_extra = matches!(form, MemForm::Strided { .. } | MemForm::Indexed { .. });
        if needs_extra != extra.is_some() {
            return Err(syntax("operand count does not match addressing mode"));
        }
        let (unit, ram) = (&mut self.unit, &mut self.ram);
        let result = match form {
            MemForm::Unit { eew, fields, ff: true } => unit.load_first_fault(ram, reg, addr, eew, fields, masked),
            MemForm::Unit { eew, fields, .. } => {
                let op = MemOp::unit(reg, addr, eew).segments(fields).masked(masked);
                if store {
                    unit.store(ram, &op)
                } else {
                    unit.load(ram, &op)
                }
            }
            MemForm::Strided { eew, fields } => {
                let stride = parse_int(extra.unwrap_or("0"))? as i64;
                let op = MemOp::strided(reg, addr, eew, stride).segments(fields).masked(masked);
                if store {
                    unit.store(ram, &op)
                } else {
                    unit.load(ram, &op)
                }
            }
            MemForm::Indexed { eew, fields, ordered } => {
                let index = parse_vreg(extra.unwrap_or(""))?;
                let op = MemOp::indexed(reg, addr, index, eew, ordered).segments(fields).masked(masked);
                if store {
                    unit.store(ram, &op)
                } else {
                    unit.load(ram, &op)
                }
            }
            MemForm::Whole { nr } if store => unit.store_whole(ram, reg, addr, nr),
            MemForm::Whole { nr } => unit.load_whole(ram, reg, addr, nr),
            MemForm::Mask if store => unit.store_mask(ram, reg, addr),
            MemForm::Mask => unit.load_mask(ram, reg, addr),
        };
        self.report(result)
    }
}

fn hex_list(vals: &[u64]) -> String {
    vals.iter()
        .map(|v| format!("{v:#x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VectorConfig;

    fn session() -> Session<Vec<u8>> {
        Session::new(
            VectorUnit::new(VectorConfig::default()),
            Ram::new(0x1000, 0x1000),
            Vec::new(),
        )
    }

    fn output(s: &Session<Vec<u8>>) -> String {
        String::from_utf8_lossy(&s.out).into_owned()
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int("0x1_000").unwrap(), 0x1000);
        assert_eq!(parse_int("0b101").unwrap(), 5);
        assert_eq!(parse_int("-1").unwrap(), u64::MAX);
        assert!(parse_int("v3").is_err());
    }

    #[test]
    fn memory_mnemonics() {
        assert_eq!(
            mem_form("vle32"),
            Some((false, MemForm::Unit { eew: Sew::E32, fields: 1, ff: false }))
        );
        assert_eq!(
            mem_form("vlseg3e8ff"),
            Some((false, MemForm::Unit { eew: Sew::E8, fields: 3, ff: true }))
        );
        assert_eq!(mem_form("vsse16"), Some((true, MemForm::Strided { eew: Sew::E16, fields: 1 })));
        assert_eq!(mem_form("vssseg2e64"), Some((true, MemForm::Strided { eew: Sew::E64, fields: 2 })));
        assert_eq!(mem_form("vsseg2e64"), Some((true, MemForm::Unit { eew: Sew::E64, fields: 2, ff: false })));
        assert_eq!(
            mem_form("vloxseg2ei16"),
            Some((false, MemForm::Indexed { eew: Sew::E16, fields: 2, ordered: true }))
        );
        assert_eq!(mem_form("vl2re32"), Some((false, MemForm::Whole { nr: 2 })));
        assert_eq!(mem_form("vs4r"), Some((true, MemForm::Whole { nr: 4 })));
        assert_eq!(mem_form("vlm"), Some((false, MemForm::Mask)));
        assert_eq!(mem_form("vsmul"), None);
        assert_eq!(mem_form("vse32ff"), None);
        assert_eq!(mem_form("vle24"), None);
    }

    #[test]
    fn runs_arithmetic_script() {
        let mut s = session();
        s.run(
            "vsetvli 4, e32, m1   # four words\n\
             vmv.v.i v2, 5\n\
             vid.v v3\n\
             vmul.vv v4, v2, v3\n\
             expect v4 = 0 5 10 15\n\
             vredsum.vs v5, v4, v3\n\
             expect v5 e32 1 = 30\n\
             vmv.x.s v5\n\
             expect x = 30\n",
        )
        .unwrap();
        assert!(output(&s).contains("vl = 4"));
        assert_eq!(s.scalar(), Some(30));
    }

    #[test]
    fn fault_only_first_and_resume() {
        let mut s = session();
        s.run(
            "vsetvli 8, e16, m1\n\
             mem e16 0x1000 1 2 3 4 5 6 7 8\n\
             fault 0x1006 0x1008\n\
             vle16ff.v v1, (0x1000)\n\
             expect vl = 3\n\
             expect trap = none\n\
             vsetvli 8, e16, m1\n\
             vle16.v v2, (0x1000)\n\
             expect trap = 13\n\
             expect vstart = 3\n\
             clear-faults\n\
             vle16.v v2, (0x1000)\n\
             expect vstart = 0\n\
             expect v2 = 1 2 3 4 5 6 7 8\n",
        )
        .unwrap();
        let out = output(&s);
        assert!(out.contains("vl truncated to 3"));
        assert!(out.contains("cause=13"));
    }

    #[test]
    fn masked_and_fixed_point() {
        let mut s = session();
        s.run(
            "vsetvli 4, e8, m1\n\
             mem e8 0x1000 0b0101\n\
             vlm.v v0, (0x1000)\n\
             vmv.v.i v1, -1\n\
             vmv.v.i v2, 0x10\n\
             vsaddu.vi v1, v2, 0x20, v0.t\n\
             expect v1 = 0x30 -1 0x30 -1\n\
             expect vxsat = 0\n\
             vsaddu.vx v1, v1, 1\n\
             expect vxsat = 1\n\
             csrw vxrm, rdn\n\
             vaaddu.vx v3, v2, 1\n\
             expect v3 = 8 8 8 8\n",
        )
        .unwrap();
    }

    #[test]
    fn store_and_peek() {
        let mut s = session();
        s.run(
            "vsetvli 2, e64, m1\n\
             vmv.v.x v8, 0x1122334455667788\n\
             vse64.v v8, (0x1100)\n\
             expect mem e32 0x1100 = 0x55667788 0x11223344\n\
             peek e8 0x1100 2\n",
        )
        .unwrap();
        assert!(output(&s).contains("mem[0x1100].e8: 0x88 0x77"));
    }

    #[test]
    fn reports_line_of_failure() {
        let mut s = session();
        let err = s.run("vsetvli 4, e8, m1\n\nexpect vl = 5\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.kind, LineError::Expectation { .. }));
        let err = s.run("vfoo.vv v1, v2, v3\n").unwrap_err();
        assert!(matches!(err.kind, LineError::Syntax(_)));
    }

    #[test]
    fn rejects_oversized_peek() {
        let mut s = session();
        let err = s.run("peek e64 0x1000 0x2000000000000000\n").unwrap_err();
        assert!(matches!(err.kind, LineError::Syntax(_)));
        let err = s.run("expect mem e8 0x1ffe = 1 2 3\n").unwrap_err();
        assert!(matches!(err.kind, LineError::Memory(_)));
    }

    #[test]
    fn vstart_cannot_pass_vl() {
        let mut s = session();
        s.run("vsetvli 4, e32, m1\ncsrw vstart, 4\nexpect vstart = 4\n")
            .unwrap();
        let err = s.run("csrw vstart, 5\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(matches!(err.kind, LineError::Syntax(_)));
        assert_eq!(s.unit.vstart(), 4);
    }

    #[test]
    fn illegal_instruction_is_reported() {
        let mut s = session();
        s.run(
            "vsetvli 4, e32, m2\n\
             vadd.vv v3, v4, v6\n\
             expect trap = 2\n",
        )
        .unwrap();
        assert!(output(&s).contains("illegal instruction"));
    }
}
