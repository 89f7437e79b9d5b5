//! Kiln parser.
//!
//! Walks the tokens produced by the Lexer and constructs a [`Unit`] containing
//! the Abstract Syntax Tree, along with the blocks, macros and imports found
//! along the way.
pub mod scope;
pub mod tree;

use crate::{
    compile::{
        lex::token::Token,
        parse::tree::{
            Arguments, Array, Binary, Block, Call, Conditional, Dict, Exec, Expression, Extends,
            Filter, For, FromImport, If, Import, Include, Index, Literal, Macro, MacroCall,
            Origin, Output, Parameter, Property, SelfCall, Set, SetValue, Test, TestKind, Tree,
            Unary, UnaryOperator, Variable,
        },
        Keyword, Operator, Unit,
    },
    log::{
        error_eof, expected_keyword, Error, INVALID_SYNTAX, INVALID_TEST, UNEXPECTED_BLOCK,
        UNEXPECTED_TOKEN,
    },
    region::Region,
};
use serde_json::{Number, Value};
use std::collections::HashMap;

use self::scope::Scope;

/// Parse the given tokens into a [`Unit`].
///
/// The tokens must have been produced from the same source text.
///
/// # Errors
///
/// Returns an [`Error`] when the tokens do not form a valid template.
pub fn parse(source: &str, tokens: Vec<(Token, Region)>, name: &str) -> Result<Unit, Error> {
    Parser::new(source, tokens, name)
        .compile()
        .map_err(|error| error.with_name(name))
}

/// Provides methods to construct a [`Unit`] from a sequence of tokens.
pub struct Parser<'source> {
    /// Source text the tokens point into.
    source: &'source str,
    /// Tokens produced by the Lexer.
    tokens: Vec<(Token, Region)>,
    /// Position of the next token.
    cursor: usize,
    /// Origin of the template, shared by its blocks and macros.
    origin: Origin,
    /// Reference to a parent template.
    extends: Option<Extends>,
    /// Every block found, including nested blocks.
    blocks: HashMap<String, Block>,
    /// Every macro found.
    macros: HashMap<String, Macro>,
    /// Namespace imports found.
    imports: Vec<Import>,
    /// Specific imports found.
    from_imports: Vec<FromImport>,
}

impl<'source> Parser<'source> {
    /// Create a new [`Parser`] from the given source, tokens and template name.
    #[inline]
    pub fn new(source: &'source str, tokens: Vec<(Token, Region)>, name: &str) -> Self {
        Self {
            source,
            tokens,
            cursor: 0,
            origin: Origin::new(name, source),
            extends: None,
            blocks: HashMap::new(),
            macros: HashMap::new(),
            imports: vec![],
            from_imports: vec![],
        }
    }

    /// Compile the tokens into a [`Unit`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the tokens do not form a valid template.
    pub fn compile(mut self) -> Result<Unit, Error> {
        let (scope, _) = self.parse_scope(&[])?;

        Ok(Unit {
            origin: self.origin,
            scope,
            extends: self.extends,
            blocks: self.blocks,
            macros: self.macros,
            imports: self.imports,
            from_imports: self.from_imports,
            parents: HashMap::new(),
        })
    }

    /// Parse statements until a block beginning with one of the given keywords
    /// is found, or until the tokens are exhausted when no keywords are given.
    ///
    /// Returns the [`Scope`] and the terminating keyword. The rest of the
    /// terminating block is left for the caller.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the tokens run out before a terminating
    /// keyword is found.
    fn parse_scope(&mut self, ends: &[Keyword]) -> Result<(Scope, Option<(Keyword, Region)>), Error> {
        let mut scope = Scope::new();

        loop {
            let Some((token, region)) = self.next() else {
                if ends.is_empty() {
                    return Ok((scope, None));
                }
                return Err(error_eof(self.source).with_help(format!(
                    "expected `{}`, did you close all blocks?",
                    ends.iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("` or `")
                )));
            };

            let tree = match token {
                Token::Text => Tree::Text(region.literal(self.source).to_string()),
                Token::BeginExpression => {
                    let expression = self.parse_expression()?;
                    let end = self.next_must(Token::EndExpression)?;
                    let text = expression.get_region().literal(self.source).to_string();

                    Tree::Output(Output {
                        expression,
                        text,
                        region: region.combine(end),
                    })
                }
                Token::BeginComment => {
                    let mut text = String::new();
                    if self.next_is(Token::Comment) {
                        let (_, body) = self.next_any_must()?;
                        text = body.literal(self.source).to_string();
                    }
                    self.next_must(Token::EndComment)?;
                    Tree::Comment(text)
                }
                Token::BeginBlock => {
                    let (keyword, keyword_region) = self.parse_keyword()?;
                    if ends.contains(&keyword) {
                        return Ok((scope, Some((keyword, keyword_region))));
                    }
                    self.parse_block(keyword, region.combine(keyword_region))?
                }
                _ => {
                    return Err(Error::parse(UNEXPECTED_TOKEN)
                        .with_pointer(self.source, region)
                        .with_help(format!("unexpected {token} outside of a tag")))
                }
            };

            scope.data.push(tree);
        }
    }

    /// Parse a block, which begins with the given keyword.
    ///
    /// A block is a call to evaluate some kind of statement which may have
    /// side effects on the render scope.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the keyword does not begin a statement or the
    /// statement is malformed.
    fn parse_block(&mut self, keyword: Keyword, region: Region) -> Result<Tree, Error> {
        match keyword {
            Keyword::If => self.parse_if(region),
            Keyword::For => self.parse_for(region),
            Keyword::Block => self.parse_named_block(region),
            Keyword::Extends => self.parse_extends(region),
            Keyword::Include => self.parse_include(region),
            Keyword::Raw => self.parse_raw(),
            Keyword::Set => self.parse_set(region),
            Keyword::Macro => self.parse_macro(region),
            Keyword::Call => self.parse_call(region),
            Keyword::Import => self.parse_import(region),
            Keyword::From => self.parse_from_import(region),
            Keyword::Exec => self.parse_exec(region),
            _ => Err(Error::parse(UNEXPECTED_BLOCK)
                .with_pointer(self.source, region)
                .with_help(expected_keyword(keyword))),
        }
    }

    /// Parse an "if" block, including every "elif" and "else" branch.
    fn parse_if(&mut self, region: Region) -> Result<Tree, Error> {
        let mut branches = vec![];
        let mut else_branch = None;
        let mut condition = self.parse_expression()?;
        self.next_must(Token::EndBlock)?;

        let end = loop {
            let (body, terminator) = self.parse_scope(&[Keyword::Elif, Keyword::Else, Keyword::EndIf])?;
            branches.push((condition, body));

            match terminator {
                Some((Keyword::Elif, _)) => {
                    condition = self.parse_expression()?;
                    self.next_must(Token::EndBlock)?;
                }
                Some((Keyword::Else, _)) => {
                    self.next_must(Token::EndBlock)?;
                    let (body, _) = self.parse_scope(&[Keyword::EndIf])?;
                    else_branch = Some(body);
                    break self.next_must(Token::EndBlock)?;
                }
                _ => break self.next_must(Token::EndBlock)?,
            }
        };

        Ok(Tree::If(If {
            branches,
            else_branch,
            region: region.combine(end),
        }))
    }

    /// Parse a "for" block.
    ///
    /// for item in items
    ///
    /// for key, value in mapping if value
    fn parse_for(&mut self, region: Region) -> Result<Tree, Error> {
        let mut targets = vec![self.parse_name()?.0];
        if self.next_is(Token::Comma) {
            self.next_must(Token::Comma)?;
            targets.push(self.parse_name()?.0);
        }
        self.next_must(Token::Keyword(Keyword::In))?;

        // The iterable and the filter are parsed below the ternary, so the
        // inline "if" is not mistaken for one.
        let iterable = self.parse_filtered()?;
        let filter = if self.next_is(Token::Keyword(Keyword::If)) {
            self.next_must(Token::Keyword(Keyword::If))?;
            Some(self.parse_filtered()?)
        } else {
            None
        };
        self.next_must(Token::EndBlock)?;

        let (body, terminator) = self.parse_scope(&[Keyword::Else, Keyword::EndFor])?;
        let mut else_branch = None;
        if let Some((Keyword::Else, _)) = terminator {
            self.next_must(Token::EndBlock)?;
            let (body, _) = self.parse_scope(&[Keyword::EndFor])?;
            else_branch = Some(body);
        }
        let end = self.next_must(Token::EndBlock)?;

        Ok(Tree::For(For {
            targets,
            iterable,
            filter,
            body,
            else_branch,
            region: region.combine(end),
        }))
    }

    /// Parse a "block" block.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if a block with the same name already exists, or
    /// the name after "endblock" does not match.
    fn parse_named_block(&mut self, region: Region) -> Result<Tree, Error> {
        let (name, name_region) = self.parse_name()?;
        let mut scoped = false;
        if self.next_is(Token::Identifier) {
            let (word, word_region) = self.parse_name()?;
            if word != "scoped" {
                return Err(Error::parse(UNEXPECTED_TOKEN)
                    .with_pointer(self.source, word_region)
                    .with_help("expected `scoped` or the end of the block"));
            }
            scoped = true;
        }
        self.next_must(Token::EndBlock)?;

        let (body, _) = self.parse_scope(&[Keyword::EndBlock])?;
        self.parse_end_name(&name)?;
        let end = self.next_must(Token::EndBlock)?;

        if self.blocks.contains_key(&name) {
            return Err(Error::parse(INVALID_SYNTAX)
                .with_pointer(self.source, name_region)
                .with_help(format!("block `{name}` is defined more than once")));
        }

        let block = Block {
            name: name.clone(),
            body,
            scoped,
            origin: self.origin.clone(),
            region: region.combine(end),
        };
        self.blocks.insert(name, block.clone());

        Ok(Tree::Block(block))
    }

    /// Parse the optional name after an end keyword, and ensure that it matches
    /// the given name.
    fn parse_end_name(&mut self, name: &str) -> Result<(), Error> {
        if self.next_is(Token::Identifier) {
            let (end_name, end_region) = self.parse_name()?;
            if end_name != name {
                return Err(Error::parse(UNEXPECTED_TOKEN)
                    .with_pointer(self.source, end_region)
                    .with_help(format!("expected `{name}`, found `{end_name}`")));
            }
        }

        Ok(())
    }

    /// Parse an "extends" tag.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the template already extends another template.
    fn parse_extends(&mut self, region: Region) -> Result<Tree, Error> {
        let target = self.parse_expression()?;
        let end = self.next_must(Token::EndBlock)?;
        let region = region.combine(end);

        if self.extends.is_some() {
            return Err(Error::parse(INVALID_SYNTAX)
                .with_pointer(self.source, region)
                .with_help("a template may only extend one other template"));
        }

        let extends = Extends { target, region };
        self.extends = Some(extends.clone());

        Ok(Tree::Extends(extends))
    }

    /// Parse an "include" tag.
    ///
    /// include "name" [ignore missing] [with context | without context]
    fn parse_include(&mut self, region: Region) -> Result<Tree, Error> {
        let target = self.parse_expression()?;
        let mut ignore_missing = false;
        let mut with_context = true;

        while self.next_is(Token::Identifier) {
            let (word, word_region) = self.parse_name()?;
            match word.as_str() {
                "ignore" => {
                    self.parse_word("missing")?;
                    ignore_missing = true;
                }
                "with" => {
                    self.parse_word("context")?;
                    with_context = true;
                }
                "without" => {
                    self.parse_word("context")?;
                    with_context = false;
                }
                _ => {
                    return Err(Error::parse(UNEXPECTED_TOKEN)
                        .with_pointer(self.source, word_region)
                        .with_help(
                            "expected `ignore missing`, `with context` or `without context`",
                        ))
                }
            }
        }
        let end = self.next_must(Token::EndBlock)?;

        Ok(Tree::Include(Include {
            target,
            ignore_missing,
            with_context,
            region: region.combine(end),
        }))
    }

    /// Parse the remainder of a raw block, which the Lexer has already captured.
    fn parse_raw(&mut self) -> Result<Tree, Error> {
        self.next_must(Token::EndBlock)?;
        let content = self.next_must(Token::Verbatim)?;
        self.next_must(Token::BeginBlock)?;
        self.next_must(Token::Keyword(Keyword::EndRaw))?;
        self.next_must(Token::EndBlock)?;

        Ok(Tree::Raw(content.literal(self.source).to_string()))
    }

    /// Parse a "set" block.
    ///
    /// set name = expression
    ///
    /// set name %}...{% endset
    fn parse_set(&mut self, region: Region) -> Result<Tree, Error> {
        let (name, _) = self.parse_name()?;

        if self.next_is(Token::Assign) {
            self.next_must(Token::Assign)?;
            let value = self.parse_expression()?;
            let end = self.next_must(Token::EndBlock)?;

            return Ok(Tree::Set(Set {
                name,
                value: SetValue::Expression(value),
                region: region.combine(end),
            }));
        }

        self.next_must(Token::EndBlock)?;
        let (body, _) = self.parse_scope(&[Keyword::EndSet])?;
        let end = self.next_must(Token::EndBlock)?;

        Ok(Tree::Set(Set {
            name,
            value: SetValue::Capture(body),
            region: region.combine(end),
        }))
    }

    /// Parse a "macro" block.
    fn parse_macro(&mut self, region: Region) -> Result<Tree, Error> {
        let (name, _) = self.parse_name()?;
        let parameters = self.parse_parameters()?;
        self.next_must(Token::EndBlock)?;

        let (body, _) = self.parse_scope(&[Keyword::EndMacro])?;
        self.parse_end_name(&name)?;
        let end = self.next_must(Token::EndBlock)?;

        let definition = Macro {
            name: name.clone(),
            parameters,
            body,
            namespace: None,
            origin: self.origin.clone(),
            region: region.combine(end),
        };
        self.macros.insert(name, definition.clone());

        Ok(Tree::Macro(definition))
    }

    /// Parse the parameters of a macro or call block.
    ///
    /// (name, title="default")
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if a default value is not a literal.
    fn parse_parameters(&mut self) -> Result<Vec<Parameter>, Error> {
        let mut parameters = vec![];
        if !self.next_is(Token::LeftParen) {
            return Ok(parameters);
        }
        self.next_must(Token::LeftParen)?;

        while !self.next_is(Token::RightParen) {
            let (name, _) = self.parse_name()?;
            let mut default = None;
            if self.next_is(Token::Assign) {
                self.next_must(Token::Assign)?;
                let expression = self.parse_expression()?;
                let value = expression.as_literal().ok_or_else(|| {
                    Error::parse(INVALID_SYNTAX)
                        .with_pointer(self.source, expression.get_region())
                        .with_help("default values of parameters must be literals")
                })?;
                default = Some(value);
            }
            parameters.push((name, default));

            if !self.next_is(Token::RightParen) {
                self.next_must(Token::Comma)?;
            }
        }
        self.next_must(Token::RightParen)?;

        Ok(parameters)
    }

    /// Parse a "call" block.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the target is not a macro call.
    fn parse_call(&mut self, region: Region) -> Result<Tree, Error> {
        let parameters = self.parse_parameters()?;
        let call = match self.parse_expression()? {
            Expression::MacroCall(call) => call,
            expression => {
                return Err(Error::parse(INVALID_SYNTAX)
                    .with_pointer(self.source, expression.get_region())
                    .with_help("the target of a call block must be a macro call"))
            }
        };
        self.next_must(Token::EndBlock)?;

        let (body, _) = self.parse_scope(&[Keyword::EndCall])?;
        let end = self.next_must(Token::EndBlock)?;

        Ok(Tree::Call(Call {
            parameters,
            call,
            body,
            region: region.combine(end),
        }))
    }

    /// Parse an "import" tag.
    ///
    /// import "target" as alias
    fn parse_import(&mut self, region: Region) -> Result<Tree, Error> {
        let target = self.parse_expression()?;
        self.next_must(Token::Keyword(Keyword::As))?;
        let (alias, _) = self.parse_name()?;
        let end = self.next_must(Token::EndBlock)?;

        let import = Import {
            target,
            alias,
            region: region.combine(end),
        };
        self.imports.push(import.clone());

        Ok(Tree::Import(import))
    }

    /// Parse a "from" tag.
    ///
    /// from "target" import name [as alias], ...
    fn parse_from_import(&mut self, region: Region) -> Result<Tree, Error> {
        let target = self.parse_expression()?;
        self.next_must(Token::Keyword(Keyword::Import))?;

        let mut names = vec![];
        loop {
            let (name, _) = self.parse_name()?;
            let mut alias = None;
            if self.next_is(Token::Keyword(Keyword::As)) {
                self.next_must(Token::Keyword(Keyword::As))?;
                alias = Some(self.parse_name()?.0);
            }
            names.push((name, alias));

            if !self.next_is(Token::Comma) {
                break;
            }
            self.next_must(Token::Comma)?;
        }
        let end = self.next_must(Token::EndBlock)?;

        let import = FromImport {
            target,
            names,
            region: region.combine(end),
        };
        self.from_imports.push(import.clone());

        Ok(Tree::FromImport(import))
    }

    /// Parse an "exec" block.
    ///
    /// The code was captured by the Lexer, the terminating tags are read
    /// normally.
    fn parse_exec(&mut self, region: Region) -> Result<Tree, Error> {
        self.next_must(Token::EndBlock)?;
        let code = self.next_must(Token::Verbatim)?;
        self.next_must(Token::BeginBlock)?;

        let mut else_branch = None;
        let mut catch_branch = None;
        let (mut keyword, mut keyword_region) = self.parse_keyword()?;

        if keyword == Keyword::Else {
            self.next_must(Token::EndBlock)?;
            let (body, terminator) =
                self.parse_scope(&[Keyword::Catch, Keyword::End, Keyword::EndExec])?;
            else_branch = Some(body);
            (keyword, keyword_region) = terminator.unwrap_or((Keyword::End, keyword_region));
        }
        if keyword == Keyword::Catch {
            self.next_must(Token::EndBlock)?;
            let (body, terminator) = self.parse_scope(&[Keyword::End, Keyword::EndExec])?;
            catch_branch = Some(body);
            (keyword, keyword_region) = terminator.unwrap_or((Keyword::End, keyword_region));
        }
        if !matches!(keyword, Keyword::End | Keyword::EndExec) {
            return Err(Error::parse(UNEXPECTED_BLOCK)
                .with_pointer(self.source, keyword_region)
                .with_help("expected `else`, `catch`, `end` or `endexec`"));
        }
        let end = self.next_must(Token::EndBlock)?;

        Ok(Tree::Exec(Exec {
            code: code.literal(self.source).to_string(),
            else_branch,
            catch_branch,
            region: region.combine(end),
        }))
    }

    /// Parse an expression.
    ///
    /// The lowest level of precedence is the ternary, which is right associative.
    ///
    /// "yes" if condition else "no"
    pub fn parse_expression(&mut self) -> Result<Expression, Error> {
        let value = self.parse_filtered()?;
        if !self.next_is(Token::Keyword(Keyword::If)) {
            return Ok(value);
        }
        self.next_must(Token::Keyword(Keyword::If))?;
        let condition = self.parse_filtered()?;

        let mut region = value.get_region().combine(condition.get_region());
        let otherwise = if self.next_is(Token::Keyword(Keyword::Else)) {
            self.next_must(Token::Keyword(Keyword::Else))?;
            let otherwise = self.parse_expression()?;
            region = region.combine(otherwise.get_region());
            Some(Box::new(otherwise))
        } else {
            None
        };

        Ok(Expression::Conditional(Conditional {
            value: Box::new(value),
            condition: Box::new(condition),
            otherwise,
            region,
        }))
    }

    /// Parse a chain of filters, which is left associative and applies to the
    /// whole `or` expression on its left.
    ///
    /// first ~ last | upper | truncate(10)
    fn parse_filtered(&mut self) -> Result<Expression, Error> {
        let mut expression = self.parse_or()?;
        while self.next_is(Token::Pipe) {
            self.next_must(Token::Pipe)?;
            let (name, name_region) = self.parse_name()?;
            let arguments = if self.next_is(Token::LeftParen) {
                self.parse_arguments()?
            } else {
                Arguments {
                    values: vec![],
                    region: name_region,
                }
            };

            expression = Expression::Filter(Filter {
                region: expression.get_region().combine(arguments.region),
                receiver: Box::new(expression),
                name,
                arguments,
                name_region,
            });
        }

        Ok(expression)
    }

    /// Parse a chain of `or` operations.
    fn parse_or(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_and()?;
        while self.next_is(Token::Keyword(Keyword::Or)) {
            self.next_must(Token::Keyword(Keyword::Or))?;
            let right = self.parse_and()?;
            left = binary(left, Operator::Or, right);
        }

        Ok(left)
    }

    /// Parse a chain of `and` operations.
    fn parse_and(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_not()?;
        while self.next_is(Token::Keyword(Keyword::And)) {
            self.next_must(Token::Keyword(Keyword::And))?;
            let right = self.parse_not()?;
            left = binary(left, Operator::And, right);
        }

        Ok(left)
    }

    /// Parse a negation.
    fn parse_not(&mut self) -> Result<Expression, Error> {
        if !self.next_is(Token::Keyword(Keyword::Not)) {
            return self.parse_comparison();
        }
        let region = self.next_must(Token::Keyword(Keyword::Not))?;
        let operand = self.parse_not()?;

        Ok(Expression::Unary(Unary {
            operator: UnaryOperator::Not,
            region: region.combine(operand.get_region()),
            operand: Box::new(operand),
        }))
    }

    /// Parse comparisons, membership checks and tests.
    fn parse_comparison(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_additive()?;

        loop {
            let operator = match self.peek() {
                Some((Token::Operator(operator), _)) if operator.is_comparison() => operator,
                Some((Token::Keyword(Keyword::In), _)) => Operator::In,
                Some((Token::Keyword(Keyword::Not), _))
                    if self.peek_nth(1).map(|(token, _)| token)
                        == Some(Token::Keyword(Keyword::In)) =>
                {
                    self.next();
                    Operator::NotIn
                }
                Some((Token::Keyword(Keyword::Is), _)) => {
                    left = self.parse_test(left)?;
                    continue;
                }
                _ => return Ok(left),
            };
            self.next();
            let right = self.parse_additive()?;
            left = binary(left, operator, right);
        }
    }

    /// Parse a test, such as `value is defined` or `value is not divisibleby 3`.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the name of the test is not recognized.
    fn parse_test(&mut self, operand: Expression) -> Result<Expression, Error> {
        self.next_must(Token::Keyword(Keyword::Is))?;
        let negated = self.next_is(Token::Keyword(Keyword::Not));
        if negated {
            self.next_must(Token::Keyword(Keyword::Not))?;
        }

        let (token, name_region) = self.next_any_must()?;
        let name = name_region.literal(self.source);
        let kind = match token {
            Token::Identifier | Token::None => TestKind::from_name(name),
            _ => None,
        }
        .ok_or_else(|| {
            Error::parse(INVALID_TEST)
                .with_pointer(self.source, name_region)
                .with_help(format!("`{name}` is not a recognized test"))
        })?;

        let mut region = operand.get_region().combine(name_region);
        let mut argument = None;
        if kind.takes_argument() {
            let value = if self.next_is(Token::LeftParen) {
                self.next_must(Token::LeftParen)?;
                let value = self.parse_expression()?;
                region = region.combine(self.next_must(Token::RightParen)?);
                value
            } else {
                let value = self.parse_additive()?;
                region = region.combine(value.get_region());
                value
            };
            argument = Some(Box::new(value));
        }

        Ok(Expression::Test(Test {
            operand: Box::new(operand),
            kind,
            negated,
            argument,
            region,
        }))
    }

    /// Parse additions, subtractions and concatenations.
    fn parse_additive(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_multiplicative()?;

        while let Some((Token::Operator(
            operator @ (Operator::Add | Operator::Subtract | Operator::Concat),
        ), _)) = self.peek()
        {
            self.next();
            let right = self.parse_multiplicative()?;
            left = binary(left, operator, right);
        }

        Ok(left)
    }

    /// Parse multiplications, divisions and modulo operations.
    fn parse_multiplicative(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_power()?;

        while let Some((Token::Operator(
            operator @ (Operator::Multiply
            | Operator::Divide
            | Operator::FloorDivide
            | Operator::Modulo),
        ), _)) = self.peek()
        {
            self.next();
            let right = self.parse_power()?;
            left = binary(left, operator, right);
        }

        Ok(left)
    }

    /// Parse exponentiation.
    fn parse_power(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_unary()?;
        while self.next_is(Token::Operator(Operator::Power)) {
            self.next();
            let right = self.parse_unary()?;
            left = binary(left, Operator::Power, right);
        }

        Ok(left)
    }

    /// Parse a unary minus or plus.
    fn parse_unary(&mut self) -> Result<Expression, Error> {
        match self.peek() {
            Some((Token::Operator(Operator::Subtract), region)) => {
                self.next();
                let operand = self.parse_unary()?;

                Ok(Expression::Unary(Unary {
                    operator: UnaryOperator::Negate,
                    region: region.combine(operand.get_region()),
                    operand: Box::new(operand),
                }))
            }
            Some((Token::Operator(Operator::Add), _)) => {
                self.next();
                self.parse_unary()
            }
            _ => self.parse_postfix(),
        }
    }

    /// Parse property access, indexing and calls.
    fn parse_postfix(&mut self) -> Result<Expression, Error> {
        let mut expression = self.parse_primary()?;

        loop {
            expression = match self.peek() {
                Some((Token::Period, _)) => {
                    self.next();
                    let (name, region) = self.parse_name()?;

                    Expression::Property(Property {
                        region: expression.get_region().combine(region),
                        receiver: Box::new(expression),
                        name,
                    })
                }
                Some((Token::LeftBracket, _)) => {
                    self.next();
                    let index = self.parse_expression()?;
                    let end = self.next_must(Token::RightBracket)?;

                    Expression::Index(Index {
                        region: expression.get_region().combine(end),
                        receiver: Box::new(expression),
                        index: Box::new(index),
                    })
                }
                Some((Token::LeftParen, _)) => {
                    let arguments = self.parse_arguments()?;
                    self.parse_call_target(expression, arguments)?
                }
                _ => return Ok(expression),
            };
        }
    }

    /// Convert a callee and its arguments into a call [`Expression`].
    ///
    /// super() -> SuperCall
    ///
    /// self.name() -> SelfCall
    ///
    /// name(...), ns.name(...) -> MacroCall
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the callee cannot be called.
    fn parse_call_target(
        &mut self,
        callee: Expression,
        arguments: Arguments,
    ) -> Result<Expression, Error> {
        let region = callee.get_region().combine(arguments.region);

        match callee {
            Expression::Variable(Variable { name, .. }) if name == "super" => {
                if !arguments.is_empty() {
                    return Err(Error::parse(INVALID_SYNTAX)
                        .with_pointer(self.source, arguments.region)
                        .with_help("`super()` does not accept arguments"));
                }
                Ok(Expression::SuperCall(region))
            }
            Expression::Property(Property { receiver, name, .. })
                if matches!(receiver.as_ref(), Expression::Variable(Variable { name, .. }) if name == "self") =>
            {
                Ok(Expression::SelfCall(SelfCall { name, region }))
            }
            Expression::Variable(Variable { name, .. }) => Ok(Expression::MacroCall(MacroCall {
                receiver: None,
                name,
                arguments,
                region,
            })),
            Expression::Property(Property { receiver, name, .. }) => {
                Ok(Expression::MacroCall(MacroCall {
                    receiver: Some(receiver),
                    name,
                    arguments,
                    region,
                }))
            }
            callee => Err(Error::parse(INVALID_SYNTAX)
                .with_pointer(self.source, callee.get_region())
                .with_help("only macros, blocks and functions may be called")),
        }
    }

    /// Parse an [`Arguments`], including the surrounding parentheses.
    ///
    /// Arguments may come in two different forms, named or anonymous.
    ///
    /// ## Named
    ///
    /// Named arguments have an explicit name, followed by `=`.
    ///
    /// title="hello"
    ///
    /// ## Anonymous
    ///
    /// Anonymous arguments have no explicitly assigned name, however they do still
    /// have implicitly assigned names when passed to a filter. View the filter
    /// module for more information on that.
    ///
    /// "hello"
    fn parse_arguments(&mut self) -> Result<Arguments, Error> {
        let begin = self.next_must(Token::LeftParen)?;
        let mut values = vec![];

        while !self.next_is(Token::RightParen) {
            let named = self.next_is(Token::Identifier)
                && self.peek_nth(1).map(|(token, _)| token) == Some(Token::Assign);

            if named {
                let (name, _) = self.parse_name()?;
                self.next_must(Token::Assign)?;
                values.push((Some(name), self.parse_expression()?));
            } else {
                values.push((None, self.parse_expression()?));
            }

            if !self.next_is(Token::RightParen) {
                self.next_must(Token::Comma)?;
            }
        }
        let end = self.next_must(Token::RightParen)?;

        Ok(Arguments {
            values,
            region: begin.combine(end),
        })
    }

    /// Parse a literal, variable, parenthesized expression, array or dict.
    fn parse_primary(&mut self) -> Result<Expression, Error> {
        let (token, region) = self.next_any_must()?;

        let expression = match token {
            Token::Number => self.parse_number_literal(region)?,
            Token::String => Expression::Literal(Literal {
                value: Value::String(self.parse_string(region)),
                region,
            }),
            Token::True => literal(Value::Bool(true), region),
            Token::False => literal(Value::Bool(false), region),
            Token::None => literal(Value::Null, region),
            Token::Identifier => Expression::Variable(Variable {
                name: region.literal(self.source).to_string(),
                region,
            }),
            Token::LeftParen => {
                let first = self.parse_expression()?;
                if !self.next_is(Token::Comma) {
                    self.next_must(Token::RightParen)?;
                    return Ok(first);
                }

                // A tuple, which behaves like an array.
                let mut items = vec![first];
                while self.next_is(Token::Comma) {
                    self.next_must(Token::Comma)?;
                    if self.next_is(Token::RightParen) {
                        break;
                    }
                    items.push(self.parse_expression()?);
                }
                let end = self.next_must(Token::RightParen)?;

                Expression::Array(Array {
                    items,
                    region: region.combine(end),
                })
            }
            Token::LeftBracket => {
                let mut items = vec![];
                while !self.next_is(Token::RightBracket) {
                    items.push(self.parse_expression()?);
                    if !self.next_is(Token::RightBracket) {
                        self.next_must(Token::Comma)?;
                    }
                }
                let end = self.next_must(Token::RightBracket)?;

                Expression::Array(Array {
                    items,
                    region: region.combine(end),
                })
            }
            Token::LeftBrace => {
                let mut pairs = vec![];
                while !self.next_is(Token::RightBrace) {
                    let key = self.parse_expression()?;
                    self.next_must(Token::Colon)?;
                    let value = self.parse_expression()?;
                    pairs.push((key, value));

                    if !self.next_is(Token::RightBrace) {
                        self.next_must(Token::Comma)?;
                    }
                }
                let end = self.next_must(Token::RightBrace)?;

                Expression::Dict(Dict {
                    pairs,
                    region: region.combine(end),
                })
            }
            _ => {
                return Err(Error::parse(UNEXPECTED_TOKEN)
                    .with_pointer(self.source, region)
                    .with_help(format!(
                        "expected a literal, a name, `(`, `[` or `{{`, found {token}"
                    )))
            }
        };

        Ok(expression)
    }

    /// Parse a Keyword.
    ///
    /// # Errors
    ///
    /// Returns an error if the next token is not a Keyword.
    fn parse_keyword(&mut self) -> Result<(Keyword, Region), Error> {
        match self.next_any_must()? {
            (Token::Keyword(keyword), region) => Ok((keyword, region)),
            (_, region) => Err(Error::parse(UNEXPECTED_TOKEN)
                .with_pointer(self.source, region)
                .with_help(expected_keyword(region.literal(self.source)))),
        }
    }

    /// Parse an identifier and return its text.
    ///
    /// # Errors
    ///
    /// Propagates an error from next_must if the next token is not an
    /// Identifier.
    fn parse_name(&mut self) -> Result<(String, Region), Error> {
        let region = self.next_must(Token::Identifier)?;

        Ok((region.literal(self.source).to_string(), region))
    }

    /// Parse an identifier that must be the given word.
    fn parse_word(&mut self, word: &str) -> Result<(), Error> {
        let (name, region) = self.parse_name()?;
        if name != word {
            return Err(Error::parse(UNEXPECTED_TOKEN)
                .with_pointer(self.source, region)
                .with_help(format!("expected `{word}`, found `{name}`")));
        }

        Ok(())
    }

    /// Parse a String from the literal value of the given Region.
    ///
    /// The recognized escapes are `\n`, `\r`, `\t`, `\\`, `\"` and `\'`; any other
    /// escape is kept as written.
    fn parse_string(&self, region: Region) -> String {
        let window = region.literal(self.source);
        let inner = window.get(1..window.len().saturating_sub(1)).unwrap_or_default();
        if !inner.contains('\\') {
            return inner.to_string();
        }

        let mut string = String::with_capacity(inner.len());
        let mut iter = inner.chars();
        while let Some(c) = iter.next() {
            if c != '\\' {
                string.push(c);
                continue;
            }
            match iter.next() {
                Some('n') => string.push('\n'),
                Some('r') => string.push('\r'),
                Some('t') => string.push('\t'),
                Some(c @ ('\\' | '"' | '\'')) => string.push(c),
                Some(c) => {
                    string.push('\\');
                    string.push(c);
                }
                None => string.push('\\'),
            }
        }

        string
    }

    /// Parse a Literal containing a Value::Number from the given Region.
    ///
    /// # Errors
    ///
    /// Returns an error if the literal value of the Region cannot be converted
    /// to a Value::Number.
    fn parse_number_literal(&self, region: Region) -> Result<Expression, Error> {
        let as_number: Number = region.literal(self.source).parse().map_err(|_| {
            Error::parse("unrecognizable number")
                .with_pointer(self.source, region)
                .with_help("numbers are digits with an optional decimal part, such as `10.5`")
        })?;

        Ok(literal(Value::Number(as_number), region))
    }

    /// Peek the next token.
    fn peek(&self) -> Option<(Token, Region)> {
        self.tokens.get(self.cursor).copied()
    }

    /// Peek the token `n` positions after the next token.
    fn peek_nth(&self, n: usize) -> Option<(Token, Region)> {
        self.tokens.get(self.cursor + n).copied()
    }

    /// Get the next token.
    fn next(&mut self) -> Option<(Token, Region)> {
        let next = self.peek();
        if next.is_some() {
            self.cursor += 1;
        }

        next
    }

    /// Returns true if the given token matches the upcoming token.
    fn next_is(&self, expect: Token) -> bool {
        self.peek().map(|(token, _)| token == expect).unwrap_or(false)
    }

    /// Get the next token, and compare it to the given token.
    ///
    /// Returns the [`Region`] of the token.
    ///
    /// # Errors
    ///
    /// An error is returned if the next token does not match the given token,
    /// or when no tokens are left.
    fn next_must(&mut self, expect: Token) -> Result<Region, Error> {
        match self.next() {
            Some((token, region)) if token == expect => Ok(region),
            Some((token, region)) => Err(Error::parse(UNEXPECTED_TOKEN)
                .with_pointer(self.source, region)
                .with_help(format!("expected {expect}, found {token}"))),
            None => Err(error_eof(self.source).with_help(format!("expected {expect}"))),
        }
    }

    /// Get the next token.
    ///
    /// Similar to "next()" but requires that a token is returned.
    ///
    /// # Errors
    ///
    /// An error is returned if no more tokens are left.
    fn next_any_must(&mut self) -> Result<(Token, Region), Error> {
        self.next().ok_or_else(|| error_eof(self.source))
    }
}

/// Create a [`Literal`] expression.
fn literal(value: Value, region: Region) -> Expression {
    Expression::Literal(Literal { value, region })
}

/// Create a [`Binary`] expression spanning both operands.
fn binary(left: Expression, operator: Operator, right: Expression) -> Expression {
    Expression::Binary(Binary {
        region: left.get_region().combine(right.get_region()),
        left: Box::new(left),
        operator,
        right: Box::new(right),
    })
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::{
        compile::{
            tokenize,
            tree::{Expression, SetValue, TestKind, Tree},
            Operator, Syntax, Unit,
        },
        log::Kind,
        Error,
    };
    use serde_json::json;

    fn helper_parse(source: &str) -> Result<Unit, Error> {
        let tokens = tokenize(source, &Syntax::default())?;
        parse(source, tokens, "test")
    }

    fn helper_expression(source: &str) -> Expression {
        let unit = helper_parse(&format!("{{{{ {source} }}}}")).unwrap();
        match unit.scope.data.into_iter().next() {
            Some(Tree::Output(output)) => output.expression,
            other => panic!("expected output, found {other:?}"),
        }
    }

    #[test]
    fn test_parse_text() {
        let unit = helper_parse("hello").unwrap();

        assert!(matches!(&unit.scope.data[..], [Tree::Text(text)] if text == "hello"));
    }

    #[test]
    fn test_parse_output_text() {
        let unit = helper_parse("{{ person.name }}").unwrap();

        assert!(matches!(&unit.scope.data[..], [Tree::Output(o)] if o.text == "person.name"));
    }

    #[test]
    fn test_parse_precedence() {
        let expression = helper_expression("1 + 2 * 3");

        let Expression::Binary(binary) = expression else {
            panic!("expected binary")
        };
        assert_eq!(binary.operator, Operator::Add);
        assert!(matches!(*binary.right, Expression::Binary(ref b) if b.operator == Operator::Multiply));
    }

    #[test]
    fn test_parse_filter_applies_to_whole_operand() {
        let expression = helper_expression("'a' ~ 'b' | upper");

        let Expression::Filter(filter) = expression else {
            panic!("expected filter")
        };
        assert_eq!(filter.name, "upper");
        assert!(matches!(*filter.receiver, Expression::Binary(ref b) if b.operator == Operator::Concat));
    }

    #[test]
    fn test_parse_filter_chain_in_ternary() {
        let expression = helper_expression("x or 'guest' | upper if x else y | lower");

        let Expression::Conditional(conditional) = expression else {
            panic!("expected conditional")
        };
        assert!(matches!(*conditional.value, Expression::Filter(ref f)
            if f.name == "upper" && matches!(*f.receiver, Expression::Binary(ref b) if b.operator == Operator::Or)));
        assert!(matches!(
            conditional.otherwise.as_deref(),
            Some(Expression::Filter(f)) if f.name == "lower"
        ));
    }

    #[test]
    fn test_parse_ternary_chain() {
        let expression = helper_expression("'a' if x else 'b' if y else 'c'");

        let Expression::Conditional(conditional) = expression else {
            panic!("expected conditional")
        };
        assert!(matches!(
            conditional.otherwise.as_deref(),
            Some(Expression::Conditional(_))
        ));
    }

    #[test]
    fn test_parse_not_in() {
        let expression = helper_expression("a not in b");

        assert!(matches!(expression, Expression::Binary(b) if b.operator == Operator::NotIn));
    }

    #[test]
    fn test_parse_test_without_parens() {
        let expression = helper_expression("x is not divisibleby 3");

        let Expression::Test(test) = expression else {
            panic!("expected test")
        };
        assert_eq!(test.kind, TestKind::DivisibleBy);
        assert!(test.negated);
        assert!(test.argument.is_some());
    }

    #[test]
    fn test_parse_unknown_test() {
        let result = helper_parse("{{ x is purple }}");

        assert_eq!(result.unwrap_err().get_kind(), Kind::Parse);
    }

    #[test]
    fn test_parse_calls() {
        assert!(matches!(helper_expression("super()"), Expression::SuperCall(_)));
        assert!(matches!(helper_expression("self.title()"), Expression::SelfCall(c) if c.name == "title"));
        assert!(matches!(
            helper_expression("forms.input('a', size=3)"),
            Expression::MacroCall(c) if c.name == "input" && c.receiver.is_some() && c.arguments.values.len() == 2
        ));
    }

    #[test]
    fn test_parse_string_escapes() {
        let expression = helper_expression(r#""a\"b\n\d""#);

        assert!(matches!(expression, Expression::Literal(l) if l.value == json!("a\"b\n\\d")));
    }

    #[test]
    fn test_parse_collections() {
        let expression = helper_expression("{'a': [1, 2], 'b': (3, 4)}");

        let Expression::Dict(dict) = expression else {
            panic!("expected dict")
        };
        assert_eq!(dict.pairs.len(), 2);
        assert!(matches!(&dict.pairs[1].1, Expression::Array(a) if a.items.len() == 2));
    }

    #[test]
    fn test_parse_if_elif_else() {
        let unit = helper_parse("{% if a %}1{% elif b %}2{% else %}3{% endif %}").unwrap();

        let Some(Tree::If(tree)) = unit.scope.data.first() else {
            panic!("expected if")
        };
        assert_eq!(tree.branches.len(), 2);
        assert!(tree.else_branch.is_some());
    }

    #[test]
    fn test_parse_for_with_filter_and_else() {
        let source = "{% for k, v in items if v %}{{ k }}{% else %}none{% endfor %}";
        let unit = helper_parse(source).unwrap();

        let Some(Tree::For(tree)) = unit.scope.data.first() else {
            panic!("expected for")
        };
        assert_eq!(tree.targets, vec!["k".to_string(), "v".to_string()]);
        assert!(tree.filter.is_some());
        assert!(tree.else_branch.is_some());
    }

    #[test]
    fn test_parse_unclosed_if() {
        let result = helper_parse("{% if a %}1");

        assert_eq!(result.unwrap_err().get_kind(), Kind::Parse);
    }

    #[test]
    fn test_parse_blocks_are_collected() {
        let unit =
            helper_parse("{% block outer %}{% block inner %}x{% endblock %}{% endblock outer %}")
                .unwrap();

        assert!(unit.blocks.contains_key("outer"));
        assert!(unit.blocks.contains_key("inner"));
    }

    #[test]
    fn test_parse_duplicate_block() {
        let result = helper_parse("{% block a %}{% endblock %}{% block a %}{% endblock %}");

        assert!(result.is_err());
    }

    #[test]
    fn test_parse_mismatched_end_name() {
        let result = helper_parse("{% block a %}{% endblock b %}");

        assert!(result.is_err());
    }

    #[test]
    fn test_parse_macro_defaults() {
        let unit = helper_parse("{% macro m(a, b=2, c=-1) %}{% endmacro %}").unwrap();
        let definition = unit.macros.get("m").unwrap();

        assert_eq!(
            definition.parameters,
            vec![
                ("a".to_string(), None),
                ("b".to_string(), Some(json!(2))),
                ("c".to_string(), Some(json!(-1))),
            ]
        );
    }

    #[test]
    fn test_parse_macro_default_must_be_literal() {
        let result = helper_parse("{% macro m(a=b) %}{% endmacro %}");

        assert!(result.is_err());
    }

    #[test]
    fn test_parse_set_capture() {
        let unit = helper_parse("{% set greeting %}hi{% endset %}").unwrap();

        assert!(matches!(
            unit.scope.data.first(),
            Some(Tree::Set(set)) if matches!(set.value, SetValue::Capture(_))
        ));
    }

    #[test]
    fn test_parse_include_options() {
        let unit = helper_parse("{% include 'a' ignore missing without context %}").unwrap();

        let Some(Tree::Include(include)) = unit.scope.data.first() else {
            panic!("expected include")
        };
        assert!(include.ignore_missing);
        assert!(!include.with_context);
    }

    #[test]
    fn test_parse_call_block() {
        let unit = helper_parse("{% call(x) list(items) %}{{ x }}{% endcall %}").unwrap();

        let Some(Tree::Call(call)) = unit.scope.data.first() else {
            panic!("expected call")
        };
        assert_eq!(call.parameters.len(), 1);
        assert_eq!(call.call.name, "list");
    }

    #[test]
    fn test_parse_exec_branches() {
        let source = "{% exec %}run(){% else %}empty{% catch %}failed{% endexec %}";
        let unit = helper_parse(source).unwrap();

        let Some(Tree::Exec(exec)) = unit.scope.data.first() else {
            panic!("expected exec")
        };
        assert_eq!(exec.code, "run()");
        assert!(exec.else_branch.is_some());
        assert!(exec.catch_branch.is_some());
    }

    #[test]
    fn test_parse_imports() {
        let unit = helper_parse("{% import 'a' as a %}{% from 'b' import x as y, z %}").unwrap();

        assert_eq!(unit.imports[0].alias, "a");
        assert_eq!(
            unit.from_imports[0].names,
            vec![("x".to_string(), Some("y".to_string())), ("z".to_string(), None)]
        );
    }

    #[test]
    fn test_parse_error_has_name() {
        let result = helper_parse("{% endfor %}");

        assert_eq!(result.unwrap_err().get_name(), Some("test"));
    }
}
