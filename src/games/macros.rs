/// Macro to register the built-in games in one catalog
///
/// Usage in games/mod.rs:
/// ```ignore
/// register_games! {
///     colors => {
///         game: ColorsGame,
///         id: "colors",
///         name: "Jogo das Cores",
///         description: "Toque na cor que o Tirilo pedir"
///     },
///     parrot => {
///         game: ParrotGame,
///         id: "parrot",
///         name: "Modo Papagaio",
///         description: "O Tirilo repete o que ouvir"
///     }
/// }
/// ```
///
/// Each game type needs `fn new(ctx: GameContext) -> anyhow::Result<Self>`.
#[macro_export]
macro_rules! register_games {
    (
        $(
            $module:ident => {
                game: $game:ident,
                id: $id:expr,
                name: $name:expr,
                description: $desc:expr
            }
        ),* $(,)?
    ) => {
        /// Every game compiled into the robot, ready for the registry.
        pub fn builtin_catalog() -> $crate::core::registry::GameCatalog {
            let mut catalog = $crate::core::registry::GameCatalog::new();
            $(
                catalog.register($crate::core::registry::GameKind::new($id, $name, $desc, |ctx| {
                    use $crate::games::$module::$game;

                    let game = $game::new(ctx)?;
                    Ok(Box::new(game) as Box<dyn $crate::core::game::Game>)
                }));
            )*
            catalog
        }

        /// Ids of the built-in games, in registration order.
        pub fn builtin_ids() -> &'static [&'static str] {
            &[$($id),*]
        }
    };
}
