//! # Ferro Program Tree
//!
//! This module contains the parse-tree representation of a Ferro program: a
//! list of program units, each with a specification part, an execution part,
//! and optional contained subprograms.
//!
//! The tree is built once by the parser and then annotated in place by the
//! semantic passes: name resolution writes `SymbolId`s into [`Name`] nodes,
//! canonicalization folds label-DO loops and directive regions into proper
//! construct nodes, and the rewrite pass turns function-reference syntax into
//! array-element references where the base name resolves to an array.

use chumsky::span::SimpleSpan;
use smol_str::SmolStr;

index_vec::define_index_type! {
    /// Handle into the symbol arena owned by the semantic context.
    ///
    /// Defined here so resolved references can be annotated directly into
    /// the tree without a dependency cycle between crates.
    pub struct SymbolId = u32;
}

/// A value paired with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T>(T, SimpleSpan<usize>);

impl<T> Spanned<T> {
    /// Create a new spanned value
    pub const fn new(value: T, span: SimpleSpan<usize>) -> Self {
        Self(value, span)
    }

    /// Get the inner value
    pub const fn value(&self) -> &T {
        &self.0
    }

    /// Get a mutable reference to the inner value
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.0
    }

    /// Get the span
    pub const fn span(&self) -> SimpleSpan<usize> {
        self.1
    }

    /// Destructure into value and span
    pub fn into_parts(self) -> (T, SimpleSpan<usize>) {
        (self.0, self.1)
    }
}

/// A source name. The text is stored lower-cased since Ferro names compare
/// case-insensitively; `symbol` is filled in by name resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Name {
    pub text: SmolStr,
    pub span: SimpleSpan<usize>,
    pub symbol: Option<SymbolId>,
}

impl Name {
    pub fn new(text: &str, span: SimpleSpan<usize>) -> Self {
        Self {
            text: SmolStr::new(text.to_ascii_lowercase()),
            span,
            symbol: None,
        }
    }

    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }
}

/// Numeric statement label (1..=99999)
pub type Label = u32;

/// A statement together with its optional label and source span
#[derive(Debug, Clone, PartialEq)]
pub struct Statement<T> {
    pub label: Option<Label>,
    pub span: SimpleSpan<usize>,
    pub value: T,
}

impl<T> Statement<T> {
    pub const fn new(label: Option<Label>, span: SimpleSpan<usize>, value: T) -> Self {
        Self { label, span, value }
    }
}

// ===================
// Program units
// ===================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub units: Vec<ProgramUnit>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramUnit {
    Main(MainProgram),
    Function(FunctionSubprogram),
    Subroutine(SubroutineSubprogram),
    Module(Module),
    BlockData(BlockData),
}

impl ProgramUnit {
    pub fn span(&self) -> SimpleSpan<usize> {
        match self {
            Self::Main(u) => u.span,
            Self::Function(u) => u.span,
            Self::Subroutine(u) => u.span,
            Self::Module(u) => u.span,
            Self::BlockData(u) => u.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MainProgram {
    /// Name from the `PROGRAM` statement, absent for an unnamed main program
    pub name: Option<Name>,
    pub body: UnitBody,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSubprogram {
    /// Declared result type, e.g. `INTEGER FUNCTION f()`
    pub prefix: Option<TypeSpec>,
    pub name: Name,
    pub dummy_args: Vec<Name>,
    /// `RESULT(r)` clause
    pub result: Option<Name>,
    pub body: UnitBody,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubroutineSubprogram {
    pub name: Name,
    pub dummy_args: Vec<Name>,
    pub body: UnitBody,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: Name,
    pub specs: Vec<Statement<SpecStmt>>,
    /// Module subprograms following `CONTAINS`
    pub contains: Vec<ProgramUnit>,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockData {
    pub name: Option<Name>,
    pub specs: Vec<Statement<SpecStmt>>,
    pub span: SimpleSpan<usize>,
}

/// Specification part, execution part, and contained subprograms of a main
/// program, function, or subroutine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnitBody {
    pub specs: Vec<Statement<SpecStmt>>,
    pub execution: Block,
    pub contains: Vec<ProgramUnit>,
}

// ===================
// Specification statements
// ===================

#[derive(Debug, Clone, PartialEq)]
pub enum SpecStmt {
    TypeDecl(TypeDeclStmt),
    DerivedTypeDef(DerivedTypeDef),
    Parameter { pairs: Vec<(Name, Spanned<Expr>)> },
    Common { blocks: Vec<CommonBlockDecl> },
    Equivalence { sets: Vec<Vec<EquivObject>> },
    Data(DataStmt),
    ImplicitNone,
    Use { module: Name },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDeclStmt {
    pub type_spec: TypeSpec,
    /// `, PARAMETER ::` attribute
    pub parameter: bool,
    pub entities: Vec<EntityDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Integer { kind: Option<Spanned<Expr>> },
    Real { kind: Option<Spanned<Expr>> },
    Logical { kind: Option<Spanned<Expr>> },
    Character { len: Option<Spanned<Expr>> },
    Derived(Name),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDecl {
    pub name: Name,
    pub array_spec: Option<Vec<DimSpec>>,
    pub init: Option<Spanned<Expr>>,
}

/// One dimension of an array spec: `upper` or `lower:upper`
#[derive(Debug, Clone, PartialEq)]
pub struct DimSpec {
    pub lower: Option<Spanned<Expr>>,
    pub upper: Spanned<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedTypeDef {
    pub name: Name,
    pub components: Vec<Statement<TypeDeclStmt>>,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommonBlockDecl {
    /// Absent for blank common
    pub name: Option<Name>,
    pub objects: Vec<CommonObject>,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommonObject {
    pub name: Name,
    pub array_spec: Option<Vec<DimSpec>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquivObject {
    pub name: Name,
    pub subscripts: Option<Vec<Spanned<Expr>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataStmt {
    pub sets: Vec<DataSet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    pub objects: Vec<DataObject>,
    pub values: Vec<DataValue>,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataObject {
    Variable(Variable),
    ImpliedDo(DataImpliedDo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataImpliedDo {
    pub objects: Vec<DataObject>,
    pub var: Name,
    pub lower: Spanned<Expr>,
    pub upper: Spanned<Expr>,
    pub step: Option<Spanned<Expr>>,
    pub span: SimpleSpan<usize>,
}

/// `repeat*value` item in a DATA value list
#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    pub repeat: Option<Spanned<Expr>>,
    pub value: Spanned<Expr>,
}

// ===================
// Executable statements and constructs
// ===================

/// One item of an execution part
#[derive(Debug, Clone, PartialEq)]
pub enum ExecPart {
    Statement(Statement<Stmt>),
    Construct(Construct),
}

pub type Block = Vec<ExecPart>;

/// Assignment target or DATA object: a name with optional subscripts
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: Name,
    pub subscripts: Option<Vec<Spanned<Expr>>>,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assignment {
        target: Variable,
        value: Spanned<Expr>,
    },
    /// Logical IF: `IF (cond) statement`
    IfStmt {
        cond: Spanned<Expr>,
        action: Box<Statement<Stmt>>,
    },
    /// Arithmetic IF: `IF (e) l1, l2, l3`
    ArithIf {
        expr: Spanned<Expr>,
        labels: [Label; 3],
    },
    Goto(Label),
    /// `ASSIGN label TO var`
    AssignLabel {
        label: Label,
        var: Name,
    },
    /// `GOTO var (l1, l2, ...)`
    AssignedGoto {
        var: Name,
        labels: Vec<Label>,
    },
    Call {
        name: Name,
        args: Vec<Spanned<Expr>>,
    },
    Return,
    Stop {
        code: Option<Spanned<Expr>>,
    },
    Continue,
    Cycle,
    Exit,
    Print {
        items: Vec<Spanned<Expr>>,
    },
    Entry {
        name: Name,
        dummy_args: Vec<Name>,
        result: Option<Name>,
    },
    /// Single-statement FORALL
    ForallStmt {
        headers: Vec<ForallHeader>,
        mask: Option<Spanned<Expr>>,
        target: Variable,
        value: Spanned<Expr>,
    },
    /// Flat `DO label [control]` opener; folded into [`DoConstruct`] by
    /// canonicalization
    LabelDo {
        terminal: Label,
        control: Option<LoopControl>,
    },
    Directive(Directive),
    Data(DataStmt),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Construct {
    If(IfConstruct),
    Do(DoConstruct),
    Forall(ForallConstruct),
    Case(CaseConstruct),
    Parallel(ParallelConstruct),
    Offload(OffloadConstruct),
    Simd(SimdConstruct),
}

impl Construct {
    pub fn span(&self) -> SimpleSpan<usize> {
        match self {
            Self::If(c) => c.span,
            Self::Do(c) => c.span,
            Self::Forall(c) => c.span,
            Self::Case(c) => c.span,
            Self::Parallel(c) => c.span,
            Self::Offload(c) => c.span,
            Self::Simd(c) => c.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfConstruct {
    /// `IF`/`ELSE IF` arms in source order
    pub arms: Vec<IfArm>,
    pub else_block: Option<Block>,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfArm {
    pub cond: Spanned<Expr>,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoConstruct {
    /// None for an infinite `DO`
    pub control: Option<LoopControl>,
    pub body: Block,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopControl {
    Counted {
        var: Name,
        lower: Spanned<Expr>,
        upper: Spanned<Expr>,
        step: Option<Spanned<Expr>>,
    },
    While(Spanned<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForallConstruct {
    pub headers: Vec<ForallHeader>,
    pub mask: Option<Spanned<Expr>>,
    pub body: Block,
    pub span: SimpleSpan<usize>,
}

/// `var = lower:upper[:step]` triplet of a FORALL header
#[derive(Debug, Clone, PartialEq)]
pub struct ForallHeader {
    pub var: Name,
    pub lower: Spanned<Expr>,
    pub upper: Spanned<Expr>,
    pub step: Option<Spanned<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseConstruct {
    pub selector: Spanned<Expr>,
    pub arms: Vec<CaseArm>,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    /// None for `CASE DEFAULT`
    pub values: Option<Vec<CaseValue>>,
    pub block: Block,
    pub span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseValue {
    Single(Spanned<Expr>),
    Range(Option<Spanned<Expr>>, Option<Spanned<Expr>>),
}

/// `!$par parallel` region, built by canonicalization
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelConstruct {
    pub body: Block,
    pub span: SimpleSpan<usize>,
}

/// `!$offload region` block, built by canonicalization
#[derive(Debug, Clone, PartialEq)]
pub struct OffloadConstruct {
    pub body: Block,
    pub span: SimpleSpan<usize>,
}

/// `!$simd loop` plus the DO construct it applies to
#[derive(Debug, Clone, PartialEq)]
pub struct SimdConstruct {
    pub body: Block,
    pub span: SimpleSpan<usize>,
}

/// Raw `!$sentinel word...` directive line
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub sentinel: SmolStr,
    pub words: Vec<SmolStr>,
    pub span: SimpleSpan<usize>,
}

impl Directive {
    /// Split the source slice after `!$` into sentinel and words, lower-cased
    pub fn from_slice(slice: &str, span: SimpleSpan<usize>) -> Self {
        let rest = slice.trim_start_matches("!$");
        let mut words = rest
            .split_whitespace()
            .map(|w| SmolStr::new(w.to_ascii_lowercase()));
        let sentinel = words.next().unwrap_or_default();
        Self {
            sentinel,
            words: words.collect(),
            span,
        }
    }

    pub fn is(&self, sentinel: &str, words: &[&str]) -> bool {
        self.sentinel == sentinel
            && self.words.len() == words.len()
            && self.words.iter().zip(words).all(|(a, b)| a == b)
    }
}

// ===================
// Expressions
// ===================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Pow,
    Mul,
    Div,
    Add,
    Sub,
    Concat,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Eqv,
    Neqv,
}

impl BinaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Pow => "**",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Concat => "//",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "/=",
            Self::And => ".and.",
            Self::Or => ".or.",
            Self::Eqv => ".eqv.",
            Self::Neqv => ".neqv.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLiteral(i64),
    RealLiteral(f64),
    LogicalLiteral(bool),
    CharLiteral(String),
    Named(Name),
    /// `name(args)` before the rewrite pass decides between a function
    /// reference and an array element
    FunctionRef {
        name: Name,
        args: Vec<Spanned<Expr>>,
    },
    ArrayElement {
        name: Name,
        subscripts: Vec<Spanned<Expr>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Spanned<Expr>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    Paren(Box<Spanned<Expr>>),
}

impl Expr {
    /// The base name of a primary reference, if this is one
    pub const fn base_name(&self) -> Option<&Name> {
        match self {
            Self::Named(name)
            | Self::FunctionRef { name, .. }
            | Self::ArrayElement { name, .. } => Some(name),
            _ => None,
        }
    }
}
