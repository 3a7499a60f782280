use logos::Logos;

/// Token stream for free-form Ferro source. Keywords match case-insensitively;
/// statement boundaries are newlines, so `\n` is a token rather than skipped
/// whitespace. A trailing `&` continues the statement on the next line.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r]+")] // Skip whitespace, but not newlines
#[logos(skip r"!([^$\n][^\n]*)?")] // Skip comments; `!$` starts a directive instead
#[logos(skip r"&[ \t]*\r?\n[ \t]*")] // Line continuation
pub enum TokenType<'a> {
    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    IntLiteral(i64),
    #[regex(r"[0-9]+\.[0-9]+([eEdD][+-]?[0-9]+)?|\.[0-9]+([eEdD][+-]?[0-9]+)?|[0-9]+[eEdD][+-]?[0-9]+")]
    RealLiteral(&'a str),
    // Quoted character literal, with '' as the embedded-quote escape
    #[regex(r"'([^'\n]|'')*'")]
    CharLiteral(&'a str),
    #[token(".true.", ignore(ascii_case))]
    True,
    #[token(".false.", ignore(ascii_case))]
    False,
    // Keywords
    #[token("assign", ignore(ascii_case))]
    Assign,
    #[token("block", ignore(ascii_case))]
    Block,
    #[token("call", ignore(ascii_case))]
    Call,
    #[token("case", ignore(ascii_case))]
    Case,
    #[token("character", ignore(ascii_case))]
    Character,
    #[token("common", ignore(ascii_case))]
    Common,
    #[token("contains", ignore(ascii_case))]
    Contains,
    #[token("continue", ignore(ascii_case))]
    Continue,
    #[token("cycle", ignore(ascii_case))]
    Cycle,
    #[token("data", ignore(ascii_case))]
    Data,
    #[token("default", ignore(ascii_case))]
    Default,
    #[token("do", ignore(ascii_case))]
    Do,
    #[token("else", ignore(ascii_case))]
    Else,
    #[token("end", ignore(ascii_case))]
    End,
    #[token("entry", ignore(ascii_case))]
    Entry,
    #[token("equivalence", ignore(ascii_case))]
    Equivalence,
    #[token("exit", ignore(ascii_case))]
    Exit,
    #[token("forall", ignore(ascii_case))]
    Forall,
    #[token("function", ignore(ascii_case))]
    Function,
    #[token("goto", ignore(ascii_case))]
    Goto,
    #[token("if", ignore(ascii_case))]
    If,
    #[token("implicit", ignore(ascii_case))]
    Implicit,
    #[token("integer", ignore(ascii_case))]
    Integer,
    #[token("logical", ignore(ascii_case))]
    Logical,
    #[token("module", ignore(ascii_case))]
    Module,
    #[token("none", ignore(ascii_case))]
    None,
    #[token("parameter", ignore(ascii_case))]
    Parameter,
    #[token("print", ignore(ascii_case))]
    Print,
    #[token("program", ignore(ascii_case))]
    Program,
    #[token("real", ignore(ascii_case))]
    Real,
    #[token("result", ignore(ascii_case))]
    Result,
    #[token("return", ignore(ascii_case))]
    Return,
    #[token("select", ignore(ascii_case))]
    Select,
    #[token("stop", ignore(ascii_case))]
    Stop,
    #[token("subroutine", ignore(ascii_case))]
    Subroutine,
    #[token("then", ignore(ascii_case))]
    Then,
    #[token("to", ignore(ascii_case))]
    To,
    #[token("type", ignore(ascii_case))]
    Type,
    #[token("use", ignore(ascii_case))]
    Use,
    #[token("while", ignore(ascii_case))]
    While,
    // Identifiers (must come after keywords); leading underscores are
    // reserved for compiler-created names like the builtin modules
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Identifier(&'a str),
    // Dot operators
    #[token(".and.", ignore(ascii_case))]
    And,
    #[token(".or.", ignore(ascii_case))]
    Or,
    #[token(".not.", ignore(ascii_case))]
    Not,
    #[token(".eqv.", ignore(ascii_case))]
    Eqv,
    #[token(".neqv.", ignore(ascii_case))]
    Neqv,
    // Operators (order matters for longest match)
    #[token("**")]
    StarStar,
    #[token("*")]
    Star,
    #[token("//")]
    SlashSlash,
    #[token("/=")]
    SlashEq,
    #[token("/")]
    Slash,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("==")]
    EqEq,
    #[token("<=")]
    Le,
    #[token("<")]
    Lt,
    #[token(">=")]
    Ge,
    #[token(">")]
    Gt,
    #[token("=")]
    Eq,
    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("::")]
    ColonColon,
    #[token(":")]
    Colon,
    #[token("\n")]
    Newline,
    // Compiler directive, e.g. `!$par parallel`
    #[regex(r"!\$[^\n]*")]
    Directive(&'a str),

    Error,
}

impl std::fmt::Display for TokenType<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
