//! # Ferro Parser
//!
//! This module implements a parser for free-form Ferro source using the
//! `chumsky` parsing library. The parser transforms a stream of tokens into
//! the program tree defined in [`crate::ast`]: program units with
//! specification parts, execution parts, and contained subprograms.
//!
//! ## Architecture
//!
//! The parser is built from combinators, grouped by grammar area:
//!
//! - **Expression parsing**: literals, designators, and the full operator
//!   precedence tower (`**` down to `.eqv.`/`.neqv.`)
//! - **Specification statements**: type declarations, PARAMETER, COMMON,
//!   EQUIVALENCE, DATA, IMPLICIT NONE, USE, derived-type definitions
//! - **Executable statements and constructs**: assignments, branches, IF/DO/
//!   FORALL/SELECT CASE constructs, and flat label-DO openers which a later
//!   pass folds into proper loop constructs
//! - **Program units**: PROGRAM, FUNCTION, SUBROUTINE, MODULE, BLOCK DATA
//!
//! Statements terminate at newlines, so `Newline` is an explicit token and
//! every statement parser consumes the newline(s) that end it. The lexer
//! guarantees a trailing newline before end of input.

use crate::ast::*;
use crate::lexer::TokenType;
use chumsky::{input::ValueInput, prelude::*};
use ferro_compiler_diagnostics::Diagnostic;

/// Result of parsing one source file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseOutput {
    pub program: Program,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a source file into a program tree.
///
/// Lexical and syntax errors are reported through the returned diagnostics;
/// on error the program may be empty or partial.
pub fn parse_source(source: &str) -> ParseOutput {
    use logos::Logos;

    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();

    for (token_result, span) in TokenType::lexer(source).spanned() {
        match token_result {
            Ok(token) => tokens.push((token, SimpleSpan::from(span))),
            Err(()) => {
                diagnostics.push(Diagnostic::lexical_error(
                    format!("Invalid token '{}'", &source[span.clone()]),
                    SimpleSpan::from(span),
                ));
            }
        }
    }
    if !diagnostics.is_empty() {
        return ParseOutput {
            program: Program::default(),
            diagnostics,
        };
    }
    tracing::trace!(tokens = tokens.len(), "lexed source");

    // The grammar relies on every statement ending in a newline
    if !matches!(tokens.last(), Some((TokenType::Newline, _))) {
        let eof = SimpleSpan::from(source.len()..source.len());
        tokens.push((TokenType::Newline, eof));
    }

    let token_stream = chumsky::input::Stream::from_iter(tokens)
        .map((0..source.len()).into(), |(t, s): (_, _)| (t, s));

    match parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
    {
        Ok(program) => ParseOutput {
            program,
            diagnostics,
        },
        Err(parse_errors) => {
            diagnostics.extend(
                parse_errors
                    .into_iter()
                    .map(|err| Diagnostic::syntax_error(format!("{err}"), *err.span())),
            );
            ParseOutput {
                program: Program::default(),
                diagnostics,
            }
        }
    }
}

// ===================
// Parser Implementation
// ===================

/// Creates a parser for source names, lower-casing as it goes
fn name_parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Name, extra::Err<Rich<'tokens, TokenType<'src>>>> + Clone
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    select! { TokenType::Identifier(s) => s }
        .map_with(|s, extra| Name::new(s, extra.span()))
        .labelled("name")
}

/// Creates a parser for numeric statement labels
fn label_parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Label, extra::Err<Rich<'tokens, TokenType<'src>>>> + Clone
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    select! { TokenType::IntLiteral(n) => n }
        .try_map(|n, span| {
            u32::try_from(n).map_err(|_| Rich::custom(span, "label value out of range"))
        })
        .labelled("label")
}

/// One-or-more newlines: the statement terminator
fn newlines_parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, (), extra::Err<Rich<'tokens, TokenType<'src>>>> + Clone
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    just(TokenType::Newline).ignored().repeated().at_least(1)
}

/// Creates a parser for expressions with Ferro operator precedence
fn expression_parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Spanned<Expr>, extra::Err<Rich<'tokens, TokenType<'src>>>> + Clone
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    let name = name_parser();

    recursive(|expr| {
        let int_lit = select! { TokenType::IntLiteral(n) => Expr::IntLiteral(n) };
        let real_lit = select! { TokenType::RealLiteral(s) => s }.map(|s: &str| {
            // `d` exponents mean the same as `e` here
            let normalized = s.replace(['d', 'D'], "e");
            Expr::RealLiteral(normalized.parse::<f64>().unwrap_or(0.0))
        });
        let logical_lit = choice((
            just(TokenType::True).to(Expr::LogicalLiteral(true)),
            just(TokenType::False).to(Expr::LogicalLiteral(false)),
        ));
        let char_lit = select! { TokenType::CharLiteral(s) => s }.map(|s: &str| {
            let inner = &s[1..s.len() - 1];
            Expr::CharLiteral(inner.replace("''", "'"))
        });
        let literal = choice((int_lit, real_lit, logical_lit, char_lit))
            .map_with(|lit, extra| Spanned::new(lit, extra.span()));

        let args = expr
            .clone()
            .separated_by(just(TokenType::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(TokenType::LParen), just(TokenType::RParen));

        // A name, or `name(args)` which resolution later classifies as a
        // function reference or an array element
        let designator = name
            .clone()
            .then(args.clone().or_not())
            .map_with(|(name, args), extra| {
                let e = match args {
                    Some(args) => Expr::FunctionRef { name, args },
                    None => Expr::Named(name),
                };
                Spanned::new(e, extra.span())
            });

        // REAL is a keyword, so the conversion intrinsic needs its own rule
        let real_conv = just(TokenType::Real)
            .ignore_then(args.clone())
            .map_with(|args, extra| {
                let span = extra.span();
                Spanned::new(
                    Expr::FunctionRef {
                        name: Name::new("real", span),
                        args,
                    },
                    span,
                )
            });

        let paren = expr
            .clone()
            .delimited_by(just(TokenType::LParen), just(TokenType::RParen))
            .map_with(|e, extra| Spanned::new(Expr::Paren(Box::new(e)), extra.span()));

        let atom = choice((literal, real_conv, designator, paren)).boxed();

        // `**` is right-associative and binds tighter than unary minus
        let power = recursive(|power| {
            atom.clone()
                .then(
                    just(TokenType::StarStar)
                        .ignore_then(power)
                        .or_not(),
                )
                .map_with(|(base, exp), extra| match exp {
                    Some(exp) => Spanned::new(
                        Expr::Binary {
                            op: BinaryOp::Pow,
                            lhs: Box::new(base),
                            rhs: Box::new(exp),
                        },
                        extra.span(),
                    ),
                    None => base,
                })
        })
        .boxed();

        let unary_op = choice((
            just(TokenType::Minus).to(UnaryOp::Negate),
            just(TokenType::Plus).to(UnaryOp::Plus),
        ));
        let factor = unary_op
            .or_not()
            .then(power)
            .map_with(|(op, operand), extra| match op {
                Some(op) => Spanned::new(
                    Expr::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    extra.span(),
                ),
                None => operand,
            })
            .boxed();

        // Helper to build left-associative binary levels
        fn bin(lhs: Spanned<Expr>, (op, rhs): (BinaryOp, Spanned<Expr>)) -> Spanned<Expr> {
            let span = SimpleSpan::from(lhs.span().start..rhs.span().end);
            Spanned::new(
                Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            )
        }

        let mul = factor
            .clone()
            .foldl(
                choice((
                    just(TokenType::Star).to(BinaryOp::Mul),
                    just(TokenType::Slash).to(BinaryOp::Div),
                ))
                .then(factor)
                .repeated(),
                bin,
            )
            .boxed();

        let add = mul
            .clone()
            .foldl(
                choice((
                    just(TokenType::Plus).to(BinaryOp::Add),
                    just(TokenType::Minus).to(BinaryOp::Sub),
                ))
                .then(mul)
                .repeated(),
                bin,
            )
            .boxed();

        let concat = add
            .clone()
            .foldl(
                just(TokenType::SlashSlash)
                    .to(BinaryOp::Concat)
                    .then(add)
                    .repeated(),
                bin,
            )
            .boxed();

        // Relational operators do not associate: `a < b < c` is a syntax error
        let rel_op = choice((
            just(TokenType::EqEq).to(BinaryOp::Eq),
            just(TokenType::SlashEq).to(BinaryOp::Ne),
            just(TokenType::Le).to(BinaryOp::Le),
            just(TokenType::Lt).to(BinaryOp::Lt),
            just(TokenType::Ge).to(BinaryOp::Ge),
            just(TokenType::Gt).to(BinaryOp::Gt),
        ));
        let comparison = concat
            .clone()
            .then(rel_op.then(concat).or_not())
            .map(|(lhs, rest)| match rest {
                Some(rest) => bin(lhs, rest),
                None => lhs,
            })
            .boxed();

        let negation = just(TokenType::Not)
            .or_not()
            .then(comparison)
            .map_with(|(not, operand), extra| match not {
                Some(_) => Spanned::new(
                    Expr::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    extra.span(),
                ),
                None => operand,
            })
            .boxed();

        let conjunction = negation
            .clone()
            .foldl(
                just(TokenType::And)
                    .to(BinaryOp::And)
                    .then(negation)
                    .repeated(),
                bin,
            )
            .boxed();

        let disjunction = conjunction
            .clone()
            .foldl(
                just(TokenType::Or)
                    .to(BinaryOp::Or)
                    .then(conjunction)
                    .repeated(),
                bin,
            )
            .boxed();

        disjunction
            .clone()
            .foldl(
                choice((
                    just(TokenType::Eqv).to(BinaryOp::Eqv),
                    just(TokenType::Neqv).to(BinaryOp::Neqv),
                ))
                .then(disjunction)
                .repeated(),
                bin,
            )
            .boxed()
    })
}

/// Creates a parser for assignment targets and DATA objects
fn variable_parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Variable, extra::Err<Rich<'tokens, TokenType<'src>>>> + Clone
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    let subscripts = expression_parser()
        .separated_by(just(TokenType::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(TokenType::LParen), just(TokenType::RParen));
    name_parser()
        .then(subscripts.or_not())
        .map_with(|(name, subscripts), extra| Variable {
            name,
            subscripts,
            span: extra.span(),
        })
}

/// Creates a parser for intrinsic and derived type specs
fn type_spec_parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, TypeSpec, extra::Err<Rich<'tokens, TokenType<'src>>>> + Clone
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    let expr = expression_parser();
    let paren_expr = expr
        .clone()
        .delimited_by(just(TokenType::LParen), just(TokenType::RParen));
    // CHARACTER length: `(len)` or the old-style `*len`
    let star_len = just(TokenType::Star).ignore_then(
        select! { TokenType::IntLiteral(n) => Expr::IntLiteral(n) }
            .map_with(|e, extra| Spanned::new(e, extra.span())),
    );
    let len_spec = paren_expr.clone().or(star_len);

    choice((
        just(TokenType::Integer)
            .ignore_then(paren_expr.clone().or_not())
            .map(|kind| TypeSpec::Integer { kind }),
        just(TokenType::Real)
            .ignore_then(paren_expr.clone().or_not())
            .map(|kind| TypeSpec::Real { kind }),
        just(TokenType::Logical)
            .ignore_then(paren_expr.or_not())
            .map(|kind| TypeSpec::Logical { kind }),
        just(TokenType::Character)
            .ignore_then(len_spec.or_not())
            .map(|len| TypeSpec::Character { len }),
        just(TokenType::Type)
            .ignore_then(
                name_parser().delimited_by(just(TokenType::LParen), just(TokenType::RParen)),
            )
            .map(TypeSpec::Derived),
    ))
}

/// Creates a parser for one item of a specification part, newline included
fn spec_item_parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Statement<SpecStmt>, extra::Err<Rich<'tokens, TokenType<'src>>>> + Clone
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    let name = name_parser();
    let expr = expression_parser();
    let nl = newlines_parser();
    let label = label_parser();

    let dim_spec = expr
        .clone()
        .then(just(TokenType::Colon).ignore_then(expr.clone()).or_not())
        .map(|(first, second)| match second {
            Some(upper) => DimSpec {
                lower: Some(first),
                upper,
            },
            None => DimSpec {
                lower: None,
                upper: first,
            },
        });
    let array_spec = dim_spec
        .separated_by(just(TokenType::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(TokenType::LParen), just(TokenType::RParen));

    let entity_decl = name
        .clone()
        .then(array_spec.clone().or_not())
        .then(just(TokenType::Eq).ignore_then(expr.clone()).or_not())
        .map(|((name, array_spec), init)| EntityDecl {
            name,
            array_spec,
            init,
        });

    let type_decl_core = type_spec_parser()
        .then(
            just(TokenType::Comma)
                .ignore_then(just(TokenType::Parameter))
                .or_not(),
        )
        .then_ignore(just(TokenType::ColonColon).or_not())
        .then(
            entity_decl
                .separated_by(just(TokenType::Comma))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map(|((type_spec, parameter), entities)| TypeDeclStmt {
            type_spec,
            parameter: parameter.is_some(),
            entities,
        });

    let parameter_stmt = just(TokenType::Parameter)
        .ignore_then(
            name.clone()
                .then_ignore(just(TokenType::Eq))
                .then(expr.clone())
                .separated_by(just(TokenType::Comma))
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(TokenType::LParen), just(TokenType::RParen)),
        )
        .map(|pairs| SpecStmt::Parameter { pairs });

    let common_object = name
        .clone()
        .then(array_spec.clone().or_not())
        .map(|(name, array_spec)| CommonObject { name, array_spec });
    let common_objects = common_object
        .separated_by(just(TokenType::Comma))
        .at_least(1)
        .collect::<Vec<_>>();
    let named_common = just(TokenType::Comma)
        .or_not()
        .ignore_then(
            name.clone()
                .delimited_by(just(TokenType::Slash), just(TokenType::Slash)),
        )
        .then(common_objects.clone())
        .map_with(|(name, objects), extra| CommonBlockDecl {
            name: Some(name),
            objects,
            span: extra.span(),
        });
    let blank_common = common_objects
        .map_with(|objects, extra| CommonBlockDecl {
            name: None,
            objects,
            span: extra.span(),
        });
    let common_stmt = just(TokenType::Common)
        .ignore_then(blank_common.or_not())
        .then(named_common.repeated().collect::<Vec<_>>())
        .map(|(blank, named)| {
            let mut blocks = Vec::new();
            blocks.extend(blank);
            blocks.extend(named);
            SpecStmt::Common { blocks }
        });

    let equiv_object = name
        .clone()
        .then(
            expr.clone()
                .separated_by(just(TokenType::Comma))
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(TokenType::LParen), just(TokenType::RParen))
                .or_not(),
        )
        .map(|(name, subscripts)| EquivObject { name, subscripts });
    let equivalence_stmt = just(TokenType::Equivalence)
        .ignore_then(
            equiv_object
                .separated_by(just(TokenType::Comma))
                .at_least(2)
                .collect::<Vec<_>>()
                .delimited_by(just(TokenType::LParen), just(TokenType::RParen))
                .separated_by(just(TokenType::Comma))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map(|sets| SpecStmt::Equivalence { sets });

    let implicit_stmt = just(TokenType::Implicit)
        .ignore_then(just(TokenType::None))
        .to(SpecStmt::ImplicitNone);

    let use_stmt = just(TokenType::Use)
        .ignore_then(name.clone())
        .map(|module| SpecStmt::Use { module });

    let data_stmt = data_stmt_parser().map(SpecStmt::Data);

    let single_line = choice((
        use_stmt,
        implicit_stmt,
        parameter_stmt,
        common_stmt,
        equivalence_stmt,
        data_stmt,
        type_decl_core.clone().map(SpecStmt::TypeDecl),
    ));

    let single_item = label
        .or_not()
        .then(single_line)
        .map_with(|(label, value), extra| Statement::new(label, extra.span(), value))
        .then_ignore(nl.clone());

    // Multi-line derived-type definition
    let component = type_decl_core
        .map_with(|decl, extra| Statement::new(None, extra.span(), decl))
        .then_ignore(nl.clone());
    let derived_def = just(TokenType::Type)
        .ignore_then(name.clone())
        .then_ignore(nl.clone())
        .then(component.repeated().collect::<Vec<_>>())
        .then_ignore(just(TokenType::End))
        .then_ignore(just(TokenType::Type))
        .then_ignore(name.or_not())
        .then_ignore(nl)
        .map_with(|(name, components), extra| {
            let span = extra.span();
            Statement::new(
                None,
                span,
                SpecStmt::DerivedTypeDef(DerivedTypeDef {
                    name,
                    components,
                    span,
                }),
            )
        });

    single_item.or(derived_def).boxed()
}

/// Creates a parser for DATA statements (shared by spec and execution parts)
fn data_stmt_parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, DataStmt, extra::Err<Rich<'tokens, TokenType<'src>>>> + Clone
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    let name = name_parser();
    let expr = expression_parser();
    let variable = variable_parser();

    // DATA values are restricted to signed literals and named constants
    let data_constant = just(TokenType::Minus)
        .to(UnaryOp::Negate)
        .or_not()
        .then(
            choice((
                select! { TokenType::IntLiteral(n) => Expr::IntLiteral(n) },
                select! { TokenType::RealLiteral(s) => s }.map(|s: &str| {
                    Expr::RealLiteral(s.replace(['d', 'D'], "e").parse::<f64>().unwrap_or(0.0))
                }),
                just(TokenType::True).to(Expr::LogicalLiteral(true)),
                just(TokenType::False).to(Expr::LogicalLiteral(false)),
                select! { TokenType::CharLiteral(s) => s }
                    .map(|s: &str| Expr::CharLiteral(s[1..s.len() - 1].replace("''", "'"))),
                select! { TokenType::Identifier(s) => s }
                    .map_with(|s, extra| Expr::Named(Name::new(s, extra.span()))),
            ))
            .map_with(|e, extra| Spanned::new(e, extra.span())),
        )
        .map_with(|(sign, value), extra| match sign {
            Some(op) => Spanned::new(
                Expr::Unary {
                    op,
                    operand: Box::new(value),
                },
                extra.span(),
            ),
            None => value,
        });

    // The repeat count is an unsigned literal or a named constant
    let data_value = choice((
        select! { TokenType::IntLiteral(n) => Expr::IntLiteral(n) },
        select! { TokenType::Identifier(s) => s }
            .map_with(|s, extra| Expr::Named(Name::new(s, extra.span()))),
    ))
    .map_with(|e, extra| Spanned::new(e, extra.span()))
    .then_ignore(just(TokenType::Star))
    .or_not()
    .then(data_constant)
    .map(|(repeat, value)| DataValue { repeat, value });

    let data_object = recursive(|data_object| {
        // Each object is comma-terminated so the trailing `var =` control
        // never joins the object list
        let implied_do = data_object
            .then_ignore(just(TokenType::Comma))
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .then(name.clone())
            .then_ignore(just(TokenType::Eq))
            .then(expr.clone())
            .then_ignore(just(TokenType::Comma))
            .then(expr.clone())
            .then(just(TokenType::Comma).ignore_then(expr.clone()).or_not())
            .delimited_by(just(TokenType::LParen), just(TokenType::RParen))
            .map_with(|((((objects, var), lower), upper), step), extra| {
                DataObject::ImpliedDo(DataImpliedDo {
                    objects,
                    var,
                    lower,
                    upper,
                    step,
                    span: extra.span(),
                })
            });
        implied_do.or(variable.clone().map(DataObject::Variable))
    });

    let data_set = data_object
        .separated_by(just(TokenType::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .then(
            data_value
                .separated_by(just(TokenType::Comma))
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(TokenType::Slash), just(TokenType::Slash)),
        )
        .map_with(|(objects, values), extra| DataSet {
            objects,
            values,
            span: extra.span(),
        });

    just(TokenType::Data)
        .ignore_then(
            data_set
                .separated_by(just(TokenType::Comma).or_not())
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map(|sets| DataStmt { sets })
}

/// Creates a parser for one item of an execution part: a construct or a
/// single (possibly labeled) statement, newline included
fn exec_part_parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, ExecPart, extra::Err<Rich<'tokens, TokenType<'src>>>> + Clone
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    let name = name_parser();
    let label = label_parser();
    let expr = expression_parser();
    let variable = variable_parser();
    let nl = newlines_parser();
    let paren_expr = expr
        .clone()
        .delimited_by(just(TokenType::LParen), just(TokenType::RParen));

    let loop_control = {
        let counted = name
            .clone()
            .then_ignore(just(TokenType::Eq))
            .then(expr.clone())
            .then_ignore(just(TokenType::Comma))
            .then(expr.clone())
            .then(just(TokenType::Comma).ignore_then(expr.clone()).or_not())
            .map(|(((var, lower), upper), step)| LoopControl::Counted {
                var,
                lower,
                upper,
                step,
            });
        let while_ctl = just(TokenType::While)
            .ignore_then(paren_expr.clone())
            .map(LoopControl::While);
        while_ctl.or(counted)
    };

    let forall_headers = {
        let header = name
            .clone()
            .then_ignore(just(TokenType::Eq))
            .then(expr.clone())
            .then_ignore(just(TokenType::Colon))
            .then(expr.clone())
            .then(just(TokenType::Colon).ignore_then(expr.clone()).or_not())
            .map(|(((var, lower), upper), step)| ForallHeader {
                var,
                lower,
                upper,
                step,
            });
        header
            .separated_by(just(TokenType::Comma))
            .at_least(1)
            .collect::<Vec<_>>()
            .then(just(TokenType::Comma).ignore_then(expr.clone()).or_not())
            .delimited_by(just(TokenType::LParen), just(TokenType::RParen))
    };

    recursive(|exec_part| {
        let block = exec_part.repeated().collect::<Vec<_>>().boxed();

        // Action statements, shared between standalone and logical-IF forms
        let stmt_core = recursive(|stmt_core| {
            let assignment = variable
                .clone()
                .then_ignore(just(TokenType::Eq))
                .then(expr.clone())
                .map(|(target, value)| Stmt::Assignment { target, value });

            let call_args = expr
                .clone()
                .separated_by(just(TokenType::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(TokenType::LParen), just(TokenType::RParen));
            let call_stmt = just(TokenType::Call)
                .ignore_then(name.clone())
                .then(call_args.clone().or_not())
                .map(|(name, args)| Stmt::Call {
                    name,
                    args: args.unwrap_or_default(),
                });

            let arith_if = just(TokenType::If)
                .ignore_then(paren_expr.clone())
                .then(label.clone())
                .then_ignore(just(TokenType::Comma))
                .then(label.clone())
                .then_ignore(just(TokenType::Comma))
                .then(label.clone())
                .map(|(((expr, l1), l2), l3)| Stmt::ArithIf {
                    expr,
                    labels: [l1, l2, l3],
                });

            let logical_if = just(TokenType::If)
                .ignore_then(paren_expr.clone())
                .then(
                    stmt_core
                        .clone()
                        .map_with(|s, extra| Box::new(Statement::new(None, extra.span(), s))),
                )
                .map(|(cond, action)| Stmt::IfStmt { cond, action });

            let goto_stmt = just(TokenType::Goto).ignore_then(choice((
                label.clone().map(Stmt::Goto),
                name.clone()
                    .then(
                        label
                            .clone()
                            .separated_by(just(TokenType::Comma))
                            .at_least(1)
                            .collect::<Vec<_>>()
                            .delimited_by(just(TokenType::LParen), just(TokenType::RParen))
                            .or_not(),
                    )
                    .map(|(var, labels)| Stmt::AssignedGoto {
                        var,
                        labels: labels.unwrap_or_default(),
                    }),
            )));

            let assign_stmt = just(TokenType::Assign)
                .ignore_then(label.clone())
                .then_ignore(just(TokenType::To))
                .then(name.clone())
                .map(|(label, var)| Stmt::AssignLabel { label, var });

            let entry_stmt = just(TokenType::Entry)
                .ignore_then(name.clone())
                .then(
                    name.clone()
                        .separated_by(just(TokenType::Comma))
                        .collect::<Vec<_>>()
                        .delimited_by(just(TokenType::LParen), just(TokenType::RParen))
                        .or_not(),
                )
                .then(
                    just(TokenType::Result)
                        .ignore_then(
                            name.clone()
                                .delimited_by(just(TokenType::LParen), just(TokenType::RParen)),
                        )
                        .or_not(),
                )
                .map(|((name, dummy_args), result)| Stmt::Entry {
                    name,
                    dummy_args: dummy_args.unwrap_or_default(),
                    result,
                });

            let forall_stmt = just(TokenType::Forall)
                .ignore_then(forall_headers.clone())
                .then(variable.clone())
                .then_ignore(just(TokenType::Eq))
                .then(expr.clone())
                .map(|(((headers, mask), target), value)| Stmt::ForallStmt {
                    headers,
                    mask,
                    target,
                    value,
                });

            let label_do = just(TokenType::Do)
                .ignore_then(label.clone())
                .then(loop_control.clone().or_not())
                .map(|(terminal, control)| Stmt::LabelDo { terminal, control });

            let print_stmt = just(TokenType::Print)
                .ignore_then(just(TokenType::Star))
                .ignore_then(
                    just(TokenType::Comma)
                        .ignore_then(
                            expr.clone()
                                .separated_by(just(TokenType::Comma))
                                .at_least(1)
                                .collect::<Vec<_>>(),
                        )
                        .or_not(),
                )
                .map(|items| Stmt::Print {
                    items: items.unwrap_or_default(),
                });

            let stop_stmt = just(TokenType::Stop)
                .ignore_then(expr.clone().or_not())
                .map(|code| Stmt::Stop { code });

            let directive = select! { TokenType::Directive(s) => s }
                .map_with(|s, extra| Stmt::Directive(Directive::from_slice(s, extra.span())));

            choice((
                call_stmt,
                arith_if,
                logical_if,
                goto_stmt,
                assign_stmt,
                entry_stmt,
                forall_stmt,
                label_do,
                print_stmt,
                stop_stmt,
                just(TokenType::Return).to(Stmt::Return),
                just(TokenType::Continue).to(Stmt::Continue),
                just(TokenType::Cycle).to(Stmt::Cycle),
                just(TokenType::Exit).to(Stmt::Exit),
                directive,
                data_stmt_parser().map(Stmt::Data),
                assignment,
            ))
            .boxed()
        });

        let statement = label
            .clone()
            .or_not()
            .then(stmt_core)
            .map_with(|(label, value), extra| Statement::new(label, extra.span(), value))
            .then_ignore(nl.clone())
            .map(ExecPart::Statement);

        let if_construct = just(TokenType::If)
            .ignore_then(paren_expr.clone())
            .then_ignore(just(TokenType::Then))
            .then_ignore(nl.clone())
            .then(block.clone())
            .then(
                just(TokenType::Else)
                    .ignore_then(just(TokenType::If))
                    .ignore_then(paren_expr.clone())
                    .then_ignore(just(TokenType::Then))
                    .then_ignore(nl.clone())
                    .then(block.clone())
                    .map(|(cond, block)| IfArm { cond, block })
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .then(
                just(TokenType::Else)
                    .then_ignore(nl.clone())
                    .ignore_then(block.clone())
                    .or_not(),
            )
            .then_ignore(just(TokenType::End))
            .then_ignore(just(TokenType::If))
            .then_ignore(nl.clone())
            .map_with(|(((first_cond, first_block), elseifs), else_block), extra| {
                let mut arms = vec![IfArm {
                    cond: first_cond,
                    block: first_block,
                }];
                arms.extend(elseifs);
                ExecPart::Construct(Construct::If(IfConstruct {
                    arms,
                    else_block,
                    span: extra.span(),
                }))
            });

        let do_construct = just(TokenType::Do)
            .ignore_then(loop_control.clone().or_not())
            .then_ignore(nl.clone())
            .then(block.clone())
            .then_ignore(just(TokenType::End))
            .then_ignore(just(TokenType::Do))
            .then_ignore(nl.clone())
            .map_with(|(control, body), extra| {
                ExecPart::Construct(Construct::Do(DoConstruct {
                    control,
                    body,
                    span: extra.span(),
                }))
            });

        let case_value = choice((
            expr.clone()
                .then_ignore(just(TokenType::Colon))
                .then(expr.clone().or_not())
                .map(|(low, high)| CaseValue::Range(Some(low), high)),
            just(TokenType::Colon)
                .ignore_then(expr.clone())
                .map(|high| CaseValue::Range(None, Some(high))),
            expr.clone().map(CaseValue::Single),
        ));
        let case_arm = just(TokenType::Case)
            .ignore_then(choice((
                just(TokenType::Default).to(None),
                case_value
                    .separated_by(just(TokenType::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>()
                    .delimited_by(just(TokenType::LParen), just(TokenType::RParen))
                    .map(Some),
            )))
            .then_ignore(nl.clone())
            .then(block.clone())
            .map_with(|(values, block), extra| CaseArm {
                values,
                block,
                span: extra.span(),
            });
        let case_construct = just(TokenType::Select)
            .ignore_then(just(TokenType::Case))
            .ignore_then(paren_expr.clone())
            .then_ignore(nl.clone())
            .then(case_arm.repeated().collect::<Vec<_>>())
            .then_ignore(just(TokenType::End))
            .then_ignore(just(TokenType::Select))
            .then_ignore(nl.clone())
            .map_with(|(selector, arms), extra| {
                ExecPart::Construct(Construct::Case(CaseConstruct {
                    selector,
                    arms,
                    span: extra.span(),
                }))
            });

        let forall_construct = just(TokenType::Forall)
            .ignore_then(forall_headers.clone())
            .then_ignore(nl.clone())
            .then(block)
            .then_ignore(just(TokenType::End))
            .then_ignore(just(TokenType::Forall))
            .then_ignore(nl.clone())
            .map_with(|((headers, mask), body), extra| {
                ExecPart::Construct(Construct::Forall(ForallConstruct {
                    headers,
                    mask,
                    body,
                    span: extra.span(),
                }))
            });

        choice((
            if_construct,
            do_construct,
            case_construct,
            forall_construct,
            statement,
        ))
        .boxed()
    })
}

/// Creates a parser for program units, including contained subprograms
fn program_unit_parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, ProgramUnit, extra::Err<Rich<'tokens, TokenType<'src>>>> + Clone
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    let name = name_parser();
    let nl = newlines_parser();
    let specs = spec_item_parser().repeated().collect::<Vec<_>>();
    let execution = exec_part_parser().repeated().collect::<Vec<_>>();

    let dummy_args = name
        .clone()
        .separated_by(just(TokenType::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(TokenType::LParen), just(TokenType::RParen));
    let result_clause = just(TokenType::Result).ignore_then(
        name.clone()
            .delimited_by(just(TokenType::LParen), just(TokenType::RParen)),
    );

    recursive(|program_unit| {
        let contains = just(TokenType::Contains)
            .then_ignore(nl.clone())
            .ignore_then(program_unit.repeated().collect::<Vec<_>>());

        let unit_body = specs
            .clone()
            .then(execution.clone())
            .then(contains.clone().or_not())
            .map(|((specs, execution), contains)| UnitBody {
                specs,
                execution,
                contains: contains.unwrap_or_default(),
            });

        let main = just(TokenType::Program)
            .ignore_then(name.clone().or_not())
            .then_ignore(nl.clone())
            .then(unit_body.clone())
            .then_ignore(just(TokenType::End))
            .then_ignore(
                just(TokenType::Program)
                    .ignore_then(name.clone().or_not())
                    .or_not(),
            )
            .then_ignore(nl.clone())
            .map_with(|(name, body), extra| {
                ProgramUnit::Main(MainProgram {
                    name,
                    body,
                    span: extra.span(),
                })
            });

        let function = type_spec_parser()
            .or_not()
            .then_ignore(just(TokenType::Function))
            .then(name.clone())
            .then(dummy_args.clone().or_not())
            .then(result_clause.clone().or_not())
            .then_ignore(nl.clone())
            .then(unit_body.clone())
            .then_ignore(just(TokenType::End))
            .then_ignore(
                just(TokenType::Function)
                    .ignore_then(name.clone().or_not())
                    .or_not(),
            )
            .then_ignore(nl.clone())
            .map_with(|((((prefix, name), dummy_args), result), body), extra| {
                ProgramUnit::Function(FunctionSubprogram {
                    prefix,
                    name,
                    dummy_args: dummy_args.unwrap_or_default(),
                    result,
                    body,
                    span: extra.span(),
                })
            });

        let subroutine = just(TokenType::Subroutine)
            .ignore_then(name.clone())
            .then(dummy_args.clone().or_not())
            .then_ignore(nl.clone())
            .then(unit_body)
            .then_ignore(just(TokenType::End))
            .then_ignore(
                just(TokenType::Subroutine)
                    .ignore_then(name.clone().or_not())
                    .or_not(),
            )
            .then_ignore(nl.clone())
            .map_with(|((name, dummy_args), body), extra| {
                ProgramUnit::Subroutine(SubroutineSubprogram {
                    name,
                    dummy_args: dummy_args.unwrap_or_default(),
                    body,
                    span: extra.span(),
                })
            });

        let module = just(TokenType::Module)
            .ignore_then(name.clone())
            .then_ignore(nl.clone())
            .then(specs.clone())
            .then(contains.or_not())
            .then_ignore(just(TokenType::End))
            .then_ignore(
                just(TokenType::Module)
                    .ignore_then(name.clone().or_not())
                    .or_not(),
            )
            .then_ignore(nl.clone())
            .map_with(|((name, specs), contains), extra| {
                ProgramUnit::Module(Module {
                    name,
                    specs,
                    contains: contains.unwrap_or_default(),
                    span: extra.span(),
                })
            });

        let block_data = just(TokenType::Block)
            .ignore_then(just(TokenType::Data))
            .ignore_then(name.clone().or_not())
            .then_ignore(nl.clone())
            .then(specs.clone())
            .then_ignore(just(TokenType::End))
            .then_ignore(
                just(TokenType::Block)
                    .ignore_then(just(TokenType::Data))
                    .ignore_then(name.clone().or_not())
                    .or_not(),
            )
            .then_ignore(nl.clone())
            .map_with(|(name, specs), extra| {
                ProgramUnit::BlockData(BlockData {
                    name,
                    specs,
                    span: extra.span(),
                })
            });

        choice((main, function, subroutine, module, block_data)).boxed()
    })
}

/// The whole-file parser: leading blank lines, then program units
pub fn parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, TokenType<'src>>>>
where
    I: ValueInput<'tokens, Token = TokenType<'src>, Span = SimpleSpan>,
{
    just(TokenType::Newline)
        .ignored()
        .repeated()
        .ignore_then(program_unit_parser().repeated().collect::<Vec<_>>())
        .map(|units| Program { units })
}
